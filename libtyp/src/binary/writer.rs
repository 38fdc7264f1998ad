use std::io::Write;

use chrono::{Datelike, Local, Timelike};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::binary::colortype::{classify_line, classify_polygon, LineColorType, PolygonColorType};
use crate::binary::{labels, HEADER_LEN, SIGNATURE};
use crate::codepage::Codepage;
use crate::error::Error;
use crate::typ::{
    pack, typecode, Bitmap, Color, FontStyle, Line, Point, Polygon, SectionKind, TypFile,
};

/// One section's accumulating state during the first layout phase: record
/// bytes plus the (type word, record offset) pairs for the index array.
#[derive(Default)]
struct Section {
    data: Vec<u8>,
    index: Vec<(u16, u32)>,
}

impl Section {
    fn push(&mut self, word: u16, record: &[u8]) {
        self.index.push((word, self.data.len() as u32));
        self.data.extend_from_slice(record);
    }

    /// The narrowest index-entry size whose offset field can hold every
    /// recorded offset.
    fn modulo(&self) -> u16 {
        let max = self.index.iter().map(|&(_, offset)| offset).max().unwrap_or(0);
        if max <= 0xFF {
            3
        } else if max <= 0xFFFF {
            4
        } else {
            5
        }
    }

    fn index_bytes(&self) -> Vec<u8> {
        let modulo = self.modulo();
        let mut out = Vec::with_capacity(self.index.len() * usize::from(modulo));
        for &(word, offset) in &self.index {
            out.extend_from_slice(&word.to_le_bytes());
            match modulo {
                3 => out.push(offset as u8),
                4 => out.extend_from_slice(&(offset as u16).to_le_bytes()),
                _ => out.extend_from_slice(&offset.to_le_bytes()[..3]),
            }
        }
        out
    }
}

/// Serializes a [`TypFile`] to the binary wire format.
///
/// Records are first emitted into four in-memory section buffers; the index
/// arrays and the header's offset fields are derived afterwards, so each
/// index can use the narrowest entry size that fits.
#[derive(Default)]
pub struct Writer {
    codepage: Codepage,
    points: Section,
    lines: Section,
    polygons: Section,
}

impl Writer {
    /// Creates a new binary writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the complete file to `sink`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnrepresentableFeature`] or
    /// [`Error::CorruptBitmap`] when a feature has no binary encoding, and
    /// with [`Error::Io`] when the sink fails. Any failure aborts the whole
    /// conversion.
    pub fn write(mut self, typ: &TypFile, sink: &mut impl Write) -> Result<(), Error> {
        self.codepage = typ.header.encoding();

        for point in &typ.points {
            let record = write_point(point, self.codepage)?;
            self.points.push(typecode::encode(point.type_code), &record);
        }
        for line in &typ.lines {
            let record = write_line(line, self.codepage)?;
            self.lines.push(typecode::encode(line.type_code), &record);
        }
        for polygon in &typ.polygons {
            let record = write_polygon(polygon, self.codepage)?;
            self.polygons.push(typecode::encode(polygon.type_code), &record);
        }

        warn_duplicates(SectionKind::Points, &self.points);
        warn_duplicates(SectionKind::Lines, &self.lines);
        warn_duplicates(SectionKind::Polygons, &self.polygons);

        let points_index = self.points.index_bytes();
        let lines_index = self.lines.index_bytes();
        let polygons_index = self.polygons.index_bytes();

        let points_array_offset = HEADER_LEN as u32;
        let lines_array_offset = points_array_offset + points_index.len() as u32;
        let polygons_array_offset = lines_array_offset + lines_index.len() as u32;
        // the order array stays empty until its encoding is understood
        let order_array_offset = polygons_array_offset + polygons_index.len() as u32;

        let points_data_offset = order_array_offset;
        let lines_data_offset = points_data_offset + self.points.data.len() as u32;
        let polygons_data_offset = lines_data_offset + self.lines.data.len() as u32;
        debug!(
            "layout: {} points, {} lines, {} polygons, {} data bytes total",
            self.points.index.len(),
            self.lines.index.len(),
            self.polygons.index.len(),
            self.points.data.len() + self.lines.data.len() + self.polygons.data.len(),
        );

        let mut header = vec![0u8; HEADER_LEN];
        header[0x00..0x02].copy_from_slice(&(HEADER_LEN as u16).to_le_bytes());
        header[0x02..0x0C].copy_from_slice(SIGNATURE);
        let version = if typ.header.version > 0 { typ.header.version } else { 1 };
        header[0x0C..0x0E].copy_from_slice(&version.to_le_bytes());

        let now = Local::now();
        let year = u16::try_from(now.year() - 1900).unwrap_or(0);
        header[0x0E..0x10].copy_from_slice(&year.to_le_bytes());
        header[0x10] = now.month0() as u8;
        header[0x11] = now.day() as u8;
        header[0x12] = now.hour() as u8;
        header[0x13] = now.minute() as u8;
        header[0x14] = now.second() as u8;

        header[0x15..0x17].copy_from_slice(&self.codepage.id().to_le_bytes());

        header[0x17..0x1B].copy_from_slice(&points_data_offset.to_le_bytes());
        header[0x1B..0x1F].copy_from_slice(&(self.points.data.len() as u32).to_le_bytes());
        header[0x1F..0x23].copy_from_slice(&lines_data_offset.to_le_bytes());
        header[0x23..0x27].copy_from_slice(&(self.lines.data.len() as u32).to_le_bytes());
        header[0x27..0x2B].copy_from_slice(&polygons_data_offset.to_le_bytes());
        header[0x2B..0x2F].copy_from_slice(&(self.polygons.data.len() as u32).to_le_bytes());

        header[0x2F..0x31].copy_from_slice(&typ.header.pid.to_le_bytes());
        header[0x31..0x33].copy_from_slice(&typ.header.fid.to_le_bytes());

        header[0x33..0x37].copy_from_slice(&points_array_offset.to_le_bytes());
        header[0x37..0x39].copy_from_slice(&self.points.modulo().to_le_bytes());
        header[0x39..0x3D].copy_from_slice(&(points_index.len() as u32).to_le_bytes());

        header[0x3D..0x41].copy_from_slice(&lines_array_offset.to_le_bytes());
        header[0x41..0x43].copy_from_slice(&self.lines.modulo().to_le_bytes());
        header[0x43..0x47].copy_from_slice(&(lines_index.len() as u32).to_le_bytes());

        header[0x47..0x4B].copy_from_slice(&polygons_array_offset.to_le_bytes());
        header[0x4B..0x4D].copy_from_slice(&self.polygons.modulo().to_le_bytes());
        header[0x4D..0x51].copy_from_slice(&(polygons_index.len() as u32).to_le_bytes());

        header[0x51..0x55].copy_from_slice(&order_array_offset.to_le_bytes());
        header[0x55..0x57].copy_from_slice(&5u16.to_le_bytes());
        header[0x57..0x5B].copy_from_slice(&0u32.to_le_bytes());

        sink.write_all(&header)?;
        sink.write_all(&points_index)?;
        sink.write_all(&lines_index)?;
        sink.write_all(&polygons_index)?;
        sink.write_all(&self.points.data)?;
        sink.write_all(&self.lines.data)?;
        sink.write_all(&self.polygons.data)?;
        Ok(())
    }
}

fn warn_duplicates(kind: SectionKind, section: &Section) {
    for (word, _) in section.index.iter().duplicates_by(|&&(word, _)| word) {
        let (type_code, subtype) = typecode::decode(*word);
        warn!("duplicate {kind} type {type_code:#x} subtype {subtype:#x}");
    }
}

/// Icon palettes mark transparency with an all-black entry, so that is what
/// transparent slots become on the wire.
fn push_icon_palette(record: &mut Vec<u8>, palette: &[Color]) {
    for color in palette {
        if color.is_transparent() {
            record.extend_from_slice(&[0, 0, 0]);
        } else {
            record.extend_from_slice(&color.to_bgr());
        }
    }
}

fn icon_dimensions(icon: &Bitmap) -> Result<(u8, u8, u8), Error> {
    if icon.width() == 0 || icon.height() == 0 {
        return Err(Error::CorruptBitmap {
            reason: "icon must have at least one pixel".into(),
        });
    }
    let width = u8::try_from(icon.width()).map_err(|_| Error::CorruptBitmap {
        reason: format!("icon width {} exceeds 255", icon.width()),
    })?;
    let height = u8::try_from(icon.height()).map_err(|_| Error::CorruptBitmap {
        reason: format!("icon height {} exceeds 255", icon.height()),
    })?;
    let ncolors = u8::try_from(icon.palette().len()).map_err(|_| Error::CorruptBitmap {
        reason: format!("palette of {} colors exceeds 255", icon.palette().len()),
    })?;
    Ok((width, height, ncolors))
}

fn write_point(point: &Point, cp: Codepage) -> Result<Vec<u8>, Error> {
    let disposition: u8 = match (&point.day_icon, &point.night_icon) {
        (Some(_), Some(_)) => 0x03,
        (None, Some(_)) => 0x02,
        (Some(_), None) => 0x01,
        (None, None) => 0x00,
    };
    let has_labels = !point.labels.is_empty();
    let has_text = point.font_style != FontStyle::Normal
        || !point.day_color.is_unset()
        || !point.night_color.is_unset();

    let mut flags = disposition;
    if has_labels {
        flags |= 0x04;
    }
    if has_text {
        flags |= 0x08;
    }

    let mut record = vec![flags];
    let primary = point.day_icon.as_ref().or(point.night_icon.as_ref());
    match primary {
        Some(icon) => {
            let (width, height, ncolors) = icon_dimensions(icon)?;
            record.extend_from_slice(&[width, height, ncolors, 0x10]);
            push_icon_palette(&mut record, icon.palette());
            record.extend_from_slice(&pack(icon.pixels(), icon.bpp())?);
        }
        None => record.extend_from_slice(&[0, 0, 0, 0]),
    }

    if let (Some(day), Some(night)) = (&point.day_icon, &point.night_icon) {
        if night.width() != day.width() || night.height() != day.height() {
            return Err(Error::UnrepresentableFeature {
                reason: format!(
                    "night icon is {}x{} but the record's dimensions are {}x{}",
                    night.width(),
                    night.height(),
                    day.width(),
                    day.height()
                ),
            });
        }
        let (_, _, ncolors) = icon_dimensions(night)?;
        record.extend_from_slice(&[ncolors, 0x10]);
        push_icon_palette(&mut record, night.palette());
        record.extend_from_slice(&pack(night.pixels(), night.bpp())?);
    }

    if has_labels {
        labels::encode(&point.labels, cp, &mut record)?;
    }
    if has_text {
        let mut text = point.font_style.to_wire();
        if !point.day_color.is_unset() {
            text |= 0x08;
        }
        if !point.night_color.is_unset() {
            text |= 0x10;
        }
        record.push(text);
        if text & 0x08 != 0 {
            record.extend_from_slice(&point.day_color.to_bgr());
        }
        if text & 0x10 != 0 {
            record.extend_from_slice(&point.night_color.to_bgr());
        }
    }
    Ok(record)
}

/// Foreground and background of a two-slot pattern palette. Slot 0 is the
/// background (pixel value 0), slot 1 the foreground.
fn pattern_colors(pattern: &Bitmap, kind: SectionKind) -> Result<(Color, Color), Error> {
    match pattern.palette() {
        [bg] => Ok((*bg, *bg)),
        [bg, fg] => Ok((*fg, *bg)),
        other => Err(Error::UnrepresentableFeature {
            reason: format!("{kind} pattern needs a two-color palette, got {}", other.len()),
        }),
    }
}

fn check_line_pattern(pattern: &Bitmap) -> Result<u8, Error> {
    if pattern.width() != 32 || pattern.height() == 0 || pattern.height() > 31 {
        return Err(Error::UnrepresentableFeature {
            reason: format!(
                "line pattern must be 32 pixels wide and 1-31 rows tall, got {}x{}",
                pattern.width(),
                pattern.height()
            ),
        });
    }
    Ok(pattern.height() as u8)
}

fn write_line(line: &Line, cp: Codepage) -> Result<Vec<u8>, Error> {
    let ctyp = classify_line(line)?;
    let pattern = line.day_pattern.as_ref().or(line.night_pattern.as_ref());
    let rows = pattern.map(check_line_pattern).transpose()?.unwrap_or(0);

    let mut flags = 0u8;
    if !line.labels.is_empty() {
        flags |= 0x01;
    }
    let mut record = vec![ctyp.wire() | (rows << 3), flags];

    if let Some(day) = pattern {
        let night = line.night_pattern.as_ref().filter(|_| line.day_pattern.is_some());
        let (day_fg, day_bg) = pattern_colors(day, SectionKind::Lines)?;
        let (night_fg, night_bg) =
            night.map_or(Ok((day_fg, day_bg)), |n| pattern_colors(n, SectionKind::Lines))?;
        match ctyp {
            LineColorType::Same => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
            }
            LineColorType::Separate => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
                record.extend_from_slice(&night_bg.to_bgr());
            }
            LineColorType::DayTransparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
                record.extend_from_slice(&night_bg.to_bgr());
            }
            LineColorType::NightTransparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
            }
            LineColorType::BorderlessSame => {
                record.extend_from_slice(&day_fg.to_bgr());
            }
            LineColorType::Transparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
            }
            LineColorType::BorderlessSeparate => {
                return Err(Error::UnrepresentableFeature {
                    reason: "pattern lines cannot use the borderless layout".into(),
                });
            }
        }
        record.extend_from_slice(&pack(day.pixels(), 1)?);
    } else {
        match ctyp {
            LineColorType::Same => {
                record.extend_from_slice(&line.day_color.to_bgr());
                record.extend_from_slice(&line.day_border_color.to_bgr());
                record.push(line.line_width);
                record.push(line.border_width);
            }
            LineColorType::Separate => {
                record.extend_from_slice(&line.day_color.to_bgr());
                record.extend_from_slice(&line.day_border_color.to_bgr());
                record.extend_from_slice(&line.night_color.to_bgr());
                record.extend_from_slice(&line.night_border_color.to_bgr());
                record.push(line.line_width);
                record.push(line.border_width);
            }
            LineColorType::BorderlessSeparate => {
                record.extend_from_slice(&line.day_color.to_bgr());
                record.extend_from_slice(&line.night_color.to_bgr());
                record.push(line.line_width);
            }
            LineColorType::BorderlessSame => {
                record.extend_from_slice(&line.day_color.to_bgr());
                record.push(line.line_width);
            }
            LineColorType::DayTransparent
            | LineColorType::NightTransparent
            | LineColorType::Transparent => unreachable!("transparent layouts require a pattern"),
        }
    }

    if flags & 0x01 != 0 {
        labels::encode(&line.labels, cp, &mut record)?;
    }
    Ok(record)
}

fn check_polygon_pattern(pattern: &Bitmap) -> Result<(), Error> {
    if pattern.width() != 32 || pattern.height() != 32 {
        return Err(Error::UnrepresentableFeature {
            reason: format!(
                "polygon pattern must be 32x32, got {}x{}",
                pattern.width(),
                pattern.height()
            ),
        });
    }
    Ok(())
}

fn write_polygon(polygon: &Polygon, cp: Codepage) -> Result<Vec<u8>, Error> {
    let ctyp = classify_polygon(polygon)?;
    let has_labels = !polygon.labels.is_empty();

    let mut first = ctyp.wire();
    if has_labels {
        first |= 0x10;
    }
    if polygon.extended_labels {
        first |= 0x40;
    }
    let mut record = vec![first];

    let pattern = polygon.day_pattern.as_ref().or(polygon.night_pattern.as_ref());
    if let Some(day) = pattern {
        check_polygon_pattern(day)?;
        let night = polygon.night_pattern.as_ref().filter(|_| polygon.day_pattern.is_some());
        let (day_fg, day_bg) = pattern_colors(day, SectionKind::Polygons)?;
        let (night_fg, night_bg) =
            night.map_or(Ok((day_fg, day_bg)), |n| pattern_colors(n, SectionKind::Polygons))?;
        match ctyp {
            PolygonColorType::Pattern => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
            }
            PolygonColorType::PatternSeparate => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
                record.extend_from_slice(&night_bg.to_bgr());
            }
            PolygonColorType::PatternNightTransparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&day_bg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
            }
            PolygonColorType::PatternDayTransparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
                record.extend_from_slice(&night_bg.to_bgr());
            }
            PolygonColorType::PatternTransparent => {
                record.extend_from_slice(&day_fg.to_bgr());
                record.extend_from_slice(&night_fg.to_bgr());
            }
            _ => unreachable!("solid layouts never come with a pattern"),
        }
        record.extend_from_slice(&pack(day.pixels(), 1)?);
    } else {
        match ctyp {
            PolygonColorType::Same => {
                record.extend_from_slice(&polygon.day_color.to_bgr());
            }
            PolygonColorType::Separate | PolygonColorType::LegacySeparate => {
                record.extend_from_slice(&polygon.day_color.to_bgr());
                record.extend_from_slice(&polygon.night_color.to_bgr());
            }
            _ => unreachable!("pattern layouts require a pattern"),
        }
    }

    if has_labels {
        labels::encode(&polygon.labels, cp, &mut record)?;
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::binary::Reader;
    use crate::typ::{Color, Header, Line, Point, TypFile};

    fn write(typ: &TypFile) -> Vec<u8> {
        let mut out = Vec::new();
        Writer::new().write(typ, &mut out).unwrap();
        out
    }

    #[test]
    fn empty_catalog_writes_bare_header() {
        let mut typ = TypFile::new();
        typ.header = Header::builder().codepage(1252).fid(3511).pid(1).build();
        let out = write(&typ);
        assert_eq!(out.len(), 0x5B);
        assert_eq!(&out[0x02..0x0C], b"GARMIN TYP");
        // all three data sections are empty
        assert_eq!(&out[0x1B..0x1F], &[0, 0, 0, 0]);
        assert_eq!(&out[0x23..0x27], &[0, 0, 0, 0]);
        assert_eq!(&out[0x2B..0x2F], &[0, 0, 0, 0]);
    }

    #[test]
    fn small_section_uses_one_byte_offsets() {
        let mut typ = TypFile::new();
        typ.points.push(Point::builder().type_code(0x2F06).build());
        let out = write(&typ);
        let modulo = u16::from_le_bytes([out[0x37], out[0x38]]);
        assert_eq!(modulo, 3);
    }

    #[test]
    fn large_section_grows_offset_width() {
        let mut typ = TypFile::new();
        for i in 0..40u32 {
            let mut line = Line::builder().type_code(0x100 + (i << 8)).build();
            line.day_color = Color::rgb(1, 2, 3);
            line.labels.set(0x04, "x".repeat(20));
            typ.lines.push(line);
        }
        let out = write(&typ);
        let modulo = u16::from_le_bytes([out[0x41], out[0x42]]);
        assert_eq!(modulo, 4);
        // and the file still reads back with every feature intact
        let (reread, issues) = Reader::new(&out).parse().unwrap();
        assert!(issues.is_empty());
        assert_eq!(reread.lines.len(), 40);
    }
}
