//! Conversion entry points for the `typconv` command line tool.

use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use libtyp::TypFile;
use tracing::{debug, info, instrument};

/// Filters applied to the catalog between parse and emit.
#[derive(Debug, Default, Copy, Clone)]
pub struct TextOptions {
    /// Drop every icon and pattern bitmap
    pub strip_bitmaps: bool,
    /// Drop every label string
    pub strip_labels: bool,
}

/// Header fields forced onto the catalog before binary emission.
#[derive(Debug, Default, Copy, Clone)]
pub struct HeaderOverrides {
    /// Replacement family ID
    pub fid: Option<u16>,
    /// Replacement product ID
    pub pid: Option<u16>,
    /// Replacement codepage
    pub codepage: Option<u16>,
}

impl HeaderOverrides {
    fn apply(self, typ: &mut TypFile) {
        if let Some(fid) = self.fid {
            typ.header.fid = fid;
        }
        if let Some(pid) = self.pid {
            typ.header.pid = pid;
        }
        if let Some(codepage) = self.codepage {
            typ.header.codepage = codepage;
        }
    }
}

/// Converts a binary TYP file to the mkgmap text form.
#[instrument]
pub fn binary_to_text(input: &Path, output: &Path, options: TextOptions) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let mut typ = libtyp::parse_binary(&bytes).context("parse binary TYP")?;
    debug!(
        "parsed {} points, {} lines, {} polygons",
        typ.points.len(),
        typ.lines.len(),
        typ.polygons.len()
    );

    if options.strip_bitmaps {
        strip_bitmaps(&mut typ);
    }
    if options.strip_labels {
        strip_labels(&mut typ);
    }

    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut sink = BufWriter::new(file);
    libtyp::write_text(&typ, &mut sink).context("write text TYP")?;
    sink.flush()?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Converts a mkgmap text file to the binary TYP form.
#[instrument]
pub fn text_to_binary(input: &Path, output: &Path, overrides: HeaderOverrides) -> Result<()> {
    let source = fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?;
    let mut typ = libtyp::parse_text(&source).context("parse text TYP")?;
    overrides.apply(&mut typ);

    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut sink = BufWriter::new(file);
    libtyp::write_binary(&typ, &mut sink).context("write binary TYP")?;
    sink.flush()?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Renders a one-screen summary of a binary TYP file.
#[instrument]
pub fn describe(input: &Path) -> Result<String> {
    let bytes = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let typ = libtyp::parse_binary(&bytes).context("parse binary TYP")?;
    Ok(format!(
        "{}\n  version:  {}\n  codepage: {}\n  FID:      {}\n  PID:      {}\n  points:   {}\n  lines:    {}\n  polygons: {}\n  draw order entries: {}\n",
        input.display(),
        typ.header.version,
        typ.header.codepage,
        typ.header.fid,
        typ.header.pid,
        typ.points.len(),
        typ.lines.len(),
        typ.polygons.len(),
        typ.draw_order.len(),
    ))
}

fn strip_bitmaps(typ: &mut TypFile) {
    for point in &mut typ.points {
        point.day_icon = None;
        point.night_icon = None;
    }
    for line in &mut typ.lines {
        line.day_pattern = None;
        line.night_pattern = None;
    }
    for polygon in &mut typ.polygons {
        polygon.day_pattern = None;
        polygon.night_pattern = None;
    }
}

fn strip_labels(typ: &mut TypFile) {
    for point in &mut typ.points {
        point.labels.clear();
    }
    for line in &mut typ.lines {
        line.labels.clear();
    }
    for polygon in &mut typ.polygons {
        polygon.labels.clear();
    }
}
