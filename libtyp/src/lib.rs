//! # libtyp
//!
//! This library reads and writes Garmin TYP files, the binary format that
//! tells a device or renderer how to draw each map feature class: which icon
//! or color a point, line or polygon type gets, which label each language
//! sees, and how overlapping features stack.
//!
//! Two serialized forms are supported over one in-memory catalog
//! ([`TypFile`]):
//!
//! - the **binary** form found on devices and inside `.img` containers
//!   (version 1, `GARMIN TYP` signature), and
//! - the **text** form understood by the mkgmap toolchain, with XPM bitmap
//!   blocks.
//!
//! Conversion is one-shot: a reader builds the catalog from a byte source, a
//! writer emits it to a sink. The catalog is a plain value tree and can be
//! freely modified in between. Binary output is not byte-identical to binary
//! input (the header timestamp, palette character assignment and
//! narrowest-encoding choices may differ); the stable contract is the
//! round-trip through the text form.
//!
//! ### Reading a binary TYP file
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("family.typ")?;
//!     let typ = libtyp::parse_binary(&bytes)?;
//!     println!(
//!         "FID {}: {} points, {} lines, {} polygons",
//!         typ.header.fid,
//!         typ.points.len(),
//!         typ.lines.len(),
//!         typ.polygons.len()
//!     );
//!     let mut out = std::fs::File::create("family.txt")?;
//!     libtyp::write_text(&typ, &mut out)?;
//!     Ok(())
//! }
//! ```
//!
//! ### Building a TYP file from scratch
//!
//! ```
//! use libtyp::{Color, Header, Point, TypFile};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut typ = TypFile::new();
//!     typ.header = Header::builder().codepage(1252).fid(3511).pid(1).build();
//!
//!     let mut junction = Point::builder().type_code(0x2F06).build();
//!     junction.labels.set(libtyp::lang::ENGLISH, "Trail Junction");
//!     junction.day_color = Color::rgb(255, 0, 0);
//!     typ.points.push(junction);
//!
//!     let mut bin = Vec::new();
//!     libtyp::write_binary(&typ, &mut bin)?;
//!     assert_eq!(&bin[0x02..0x0C], b"GARMIN TYP");
//!     Ok(())
//! }
//! ```
//!
//! Label text is always Unicode in the catalog; the binary form stores it in
//! the header's codepage (1250, 1251, 1252, 1254, 437 or UTF-8), replacing
//! what that page cannot express with `?`.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

pub mod binary;
mod codepage;
mod error;
pub mod text;
pub mod typ;

use std::io;

use tracing::warn;

pub use codepage::Codepage;
pub use error::Error;
pub use typ::{
    lang, Bitmap, Color, ColorMode, FontStyle, Header, Labels, Line, LineStyle, Point, Polygon,
    SectionKind, TypFile,
};

/// Parses a binary TYP byte buffer into a catalog.
///
/// Corrupt feature records are dropped with a warning; only header-level
/// corruption fails the whole parse.
///
/// # Errors
///
/// Fails with [`Error::InvalidSignature`] or [`Error::Truncated`] when the
/// header is unusable.
pub fn parse_binary(bytes: &[u8]) -> Result<TypFile, Error> {
    let (typ, issues) = binary::Reader::new(bytes).parse()?;
    for issue in &issues {
        warn!("{issue}");
    }
    Ok(typ)
}

/// Serializes a catalog to the binary TYP format.
///
/// # Errors
///
/// Fails when a feature has no binary encoding or the sink fails; any
/// failure aborts the conversion.
pub fn write_binary(typ: &TypFile, sink: &mut impl io::Write) -> Result<(), Error> {
    binary::Writer::new().write(typ, sink)
}

/// Parses the mkgmap text form into a catalog.
///
/// # Errors
///
/// Fails with [`Error::TextSyntax`] when a section never closes; everything
/// else is tolerated and skipped.
pub fn parse_text(source: &str) -> Result<TypFile, Error> {
    text::Reader::new(source).read()
}

/// Emits a catalog in the mkgmap text form.
///
/// # Errors
///
/// Fails when a bitmap palette exceeds what XPM can index or the sink fails.
pub fn write_text(typ: &TypFile, sink: &mut impl io::Write) -> Result<(), Error> {
    text::Writer::new(sink).write(typ)
}
