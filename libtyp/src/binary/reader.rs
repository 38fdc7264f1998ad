use std::fmt::Display;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::binary::colortype::{LineColorType, PolygonColorType};
use crate::binary::{labels, Cursor, HEADER_LEN, SIGNATURE};
use crate::codepage::Codepage;
use crate::error::Error;
use crate::typ::{
    bpp_for_palette, packed_len, typecode, unpack, Bitmap, Color, FontStyle, Header, Line, Point,
    Polygon, SectionKind, TypFile,
};

/// A record-level parse failure. The offending record is dropped; the rest
/// of the file is still read.
#[derive(Debug)]
pub struct RecordIssue {
    /// Section the record belongs to
    pub kind: SectionKind,
    /// Position in the section's index array
    pub index: usize,
    /// Absolute byte offset of the record
    pub offset: usize,
    /// What went wrong
    pub error: Error,
}

impl Display for RecordIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dropped {} record {} at offset {:#x}: {}",
            self.kind, self.index, self.offset, self.error
        )
    }
}

/// Section metadata from the fixed header.
#[derive(Debug, Default, Copy, Clone)]
struct SectionInfo {
    data_offset: u32,
    array_offset: u32,
    array_modulo: u16,
    array_size: u32,
}

/// Parses binary TYP data into a [`TypFile`].
///
/// A corrupt header is fatal. Corrupt feature records are dropped and
/// reported; the remaining index entries are still attempted.
pub struct Reader<'a> {
    buf: &'a [u8],
    codepage: Codepage,
    issues: Vec<RecordIssue>,
}

impl<'a> Reader<'a> {
    /// Creates a reader over a complete TYP byte buffer.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, codepage: Codepage::default(), issues: Vec::new() }
    }

    /// Parses the buffer, returning the catalog together with any
    /// record-level issues encountered on the way.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSignature`] or [`Error::Truncated`] if the
    /// header itself is unusable.
    pub fn parse(mut self) -> Result<(TypFile, Vec<RecordIssue>), Error> {
        if self.buf.get(0x02..0x0C) != Some(SIGNATURE.as_slice()) {
            return Err(Error::InvalidSignature);
        }
        if self.buf.len() < HEADER_LEN {
            return Err(Error::Truncated { offset: self.buf.len() });
        }

        let descriptor = self.u16_at(0x00)?;
        let version = self.u16_at(0x0C)?;
        let year = self.u16_at(0x0E)? + 1900;
        debug!(
            "TYP header: descriptor {descriptor:#x}, version {version}, written {year}-{:02}-{:02}",
            u16::from(self.buf[0x10]) + 1,
            self.buf[0x11]
        );

        let codepage = self.u16_at(0x15)?;
        let pid = self.u16_at(0x2F)?;
        let fid = self.u16_at(0x31)?;
        self.codepage = Codepage::from_id(codepage);

        let points = SectionInfo {
            data_offset: self.u32_at(0x17)?,
            array_offset: self.u32_at(0x33)?,
            array_modulo: self.u16_at(0x37)?,
            array_size: self.u32_at(0x39)?,
        };
        let lines = SectionInfo {
            data_offset: self.u32_at(0x1F)?,
            array_offset: self.u32_at(0x3D)?,
            array_modulo: self.u16_at(0x41)?,
            array_size: self.u32_at(0x43)?,
        };
        let polygons = SectionInfo {
            data_offset: self.u32_at(0x27)?,
            array_offset: self.u32_at(0x47)?,
            array_modulo: self.u16_at(0x4B)?,
            array_size: self.u32_at(0x4D)?,
        };
        let order = SectionInfo {
            data_offset: 0,
            array_offset: self.u32_at(0x51)?,
            array_modulo: self.u16_at(0x55)?,
            array_size: self.u32_at(0x57)?,
        };

        let mut typ = TypFile::new();
        typ.header = Header::builder()
            .version(version)
            .codepage(codepage)
            .fid(fid)
            .pid(pid)
            .build();

        typ.points = self.read_section(points, SectionKind::Points, read_point);
        typ.lines = self.read_section(lines, SectionKind::Lines, read_line);
        typ.polygons = self.read_section(polygons, SectionKind::Polygons, read_polygon);
        typ.draw_order = self.read_draw_order(order);

        warn_duplicates(SectionKind::Points, typ.points.iter().map(|p| (p.type_code, p.subtype)));
        warn_duplicates(SectionKind::Lines, typ.lines.iter().map(|l| (l.type_code, l.subtype)));
        warn_duplicates(SectionKind::Polygons, typ.polygons.iter().map(|p| (p.type_code, p.subtype)));

        Ok((typ, self.issues))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, Error> {
        Cursor::new(self.buf, offset).u16()
    }

    fn u32_at(&self, offset: usize) -> Result<u32, Error> {
        let mut c = Cursor::new(self.buf, offset);
        let bytes = c.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_section<T>(
        &mut self,
        info: SectionInfo,
        kind: SectionKind,
        read_one: fn(&mut Cursor<'a>, Codepage, u32, u8) -> Result<T, Error>,
    ) -> Vec<T> {
        let Some(count) = section_entry_count(info, kind) else {
            return Vec::new();
        };
        let modulo = usize::from(info.array_modulo);
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let entry_offset = info.array_offset as usize + i * modulo;
            let mut entry = Cursor::new(self.buf, entry_offset);
            let (word, rel) = match read_array_entry(&mut entry, info.array_modulo) {
                Ok(e) => e,
                Err(error) => {
                    self.issues.push(RecordIssue { kind, index: i, offset: entry_offset, error });
                    continue;
                }
            };
            let (type_code, subtype) = typecode::decode(word);
            let offset = info.data_offset as usize + rel as usize;
            let mut record = Cursor::new(self.buf, offset);
            match read_one(&mut record, self.codepage, type_code, subtype) {
                Ok(feature) => out.push(feature),
                Err(error) => {
                    self.issues.push(RecordIssue { kind, index: i, offset, error });
                }
            }
        }
        out
    }

    // Only the type words are meaningful to us here; the offsets point into
    // an order data section whose encoding is not pinned down.
    fn read_draw_order(&mut self, info: SectionInfo) -> Vec<u32> {
        let Some(count) = section_entry_count(info, SectionKind::DrawOrder) else {
            return Vec::new();
        };
        let modulo = usize::from(info.array_modulo);
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let entry_offset = info.array_offset as usize + i * modulo;
            let mut entry = Cursor::new(self.buf, entry_offset);
            match read_array_entry(&mut entry, info.array_modulo) {
                Ok((word, _)) => out.push(typecode::decode(word).0),
                Err(error) => {
                    self.issues.push(RecordIssue {
                        kind: SectionKind::DrawOrder,
                        index: i,
                        offset: entry_offset,
                        error,
                    });
                }
            }
        }
        out
    }
}

fn section_entry_count(info: SectionInfo, kind: SectionKind) -> Option<usize> {
    if info.array_size == 0 {
        return None;
    }
    if !matches!(info.array_modulo, 3..=5) {
        warn!("{kind} index array has unsupported entry size {}, skipping section", info.array_modulo);
        return None;
    }
    let modulo = u32::from(info.array_modulo);
    if info.array_size % modulo != 0 {
        warn!(
            "{kind} index array size {} is not a multiple of {modulo}, ignoring the tail",
            info.array_size
        );
    }
    Some((info.array_size / modulo) as usize)
}

/// An index entry: the bit-packed type word followed by a 1/2/3-byte
/// little-endian offset into the section's data region.
fn read_array_entry(c: &mut Cursor<'_>, modulo: u16) -> Result<(u16, u32), Error> {
    let word = c.u16()?;
    let offset = match modulo {
        3 => u32::from(c.u8()?),
        4 => u32::from(c.u16()?),
        _ => {
            let bytes = c.take(3)?;
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
        }
    };
    Ok((word, offset))
}

/// Icon palettes mark transparency with an all-black entry.
fn read_icon_palette(c: &mut Cursor<'_>, ncolors: usize) -> Result<Vec<Color>, Error> {
    let mut palette = Vec::with_capacity(ncolors);
    for _ in 0..ncolors {
        let color = c.bgr()?;
        palette.push(if color.r == 0 && color.g == 0 && color.b == 0 {
            Color::TRANSPARENT
        } else {
            color
        });
    }
    Ok(palette)
}

fn read_icon(c: &mut Cursor<'_>, width: u16, height: u16, ncolors: usize) -> Result<Bitmap, Error> {
    let palette = read_icon_palette(c, ncolors)?;
    let bpp = bpp_for_palette(ncolors);
    let packed = c.take(packed_len(width, height, bpp))?;
    let pixels = unpack(packed, width, height, bpp)?;
    Bitmap::new(width, height, palette, pixels)
}

fn read_point(c: &mut Cursor<'_>, cp: Codepage, type_code: u32, subtype: u8) -> Result<Point, Error> {
    let flags = c.u8()?;
    let width = u16::from(c.u8()?);
    let height = u16::from(c.u8()?);
    let ncolors = usize::from(c.u8()?);
    let _mode = c.u8()?;

    let disposition = flags & 0x03;
    let mut point = Point::builder().type_code(type_code).subtype(subtype).build();

    if width > 0 && height > 0 {
        let first = read_icon(c, width, height, ncolors)?;
        if disposition == 0x02 {
            point.night_icon = Some(first);
        } else {
            point.day_icon = Some(first);
        }
        if disposition == 0x03 {
            let night_colors = usize::from(c.u8()?);
            let _night_mode = c.u8()?;
            point.night_icon = Some(read_icon(c, width, height, night_colors)?);
        }
    }

    if flags & 0x04 != 0 {
        point.labels = labels::decode(c, cp)?;
    }
    if flags & 0x08 != 0 {
        let text = c.u8()?;
        point.font_style = FontStyle::from_wire(text);
        if text & 0x08 != 0 {
            point.day_color = c.bgr()?;
        }
        if text & 0x10 != 0 {
            point.night_color = c.bgr()?;
        }
    }
    Ok(point)
}

fn read_line(c: &mut Cursor<'_>, cp: Codepage, type_code: u32, subtype: u8) -> Result<Line, Error> {
    let first = c.u8()?;
    let rows = u16::from(first >> 3);
    let flags = c.u8()?;
    let ctyp = LineColorType::from_wire(first & 0x07)?;

    let mut line = Line::builder().type_code(type_code).subtype(subtype).build();
    if rows > 0 {
        read_line_pattern(c, ctyp, rows, &mut line)?;
    } else {
        read_line_solid(c, ctyp, &mut line)?;
    }

    if flags & 0x01 != 0 {
        line.labels = labels::decode(c, cp)?;
    }
    if flags & 0x04 != 0 {
        skip_text_block(c)?;
    }
    Ok(line)
}

fn read_line_solid(c: &mut Cursor<'_>, ctyp: LineColorType, line: &mut Line) -> Result<(), Error> {
    match ctyp {
        LineColorType::Same => {
            line.day_color = c.bgr()?;
            line.day_border_color = c.bgr()?;
            line.night_color = line.day_color;
            line.night_border_color = line.day_border_color;
            line.line_width = c.u8()?;
            line.border_width = c.u8()?;
        }
        LineColorType::Separate => {
            line.day_color = c.bgr()?;
            line.day_border_color = c.bgr()?;
            line.night_color = c.bgr()?;
            line.night_border_color = c.bgr()?;
            line.line_width = c.u8()?;
            line.border_width = c.u8()?;
        }
        LineColorType::BorderlessSeparate => {
            line.day_color = c.bgr()?;
            line.night_color = c.bgr()?;
            line.line_width = c.u8()?;
        }
        LineColorType::BorderlessSame => {
            line.day_color = c.bgr()?;
            line.night_color = line.day_color;
            line.line_width = c.u8()?;
        }
        LineColorType::DayTransparent
        | LineColorType::NightTransparent
        | LineColorType::Transparent => {
            return Err(Error::UnsupportedColorType {
                kind: SectionKind::Lines,
                value: ctyp.wire(),
            });
        }
    }
    Ok(())
}

fn read_line_pattern(
    c: &mut Cursor<'_>,
    ctyp: LineColorType,
    rows: u16,
    line: &mut Line,
) -> Result<(), Error> {
    let (day_palette, night_palette) = match ctyp {
        LineColorType::Same => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            (vec![bg, fg], None)
        }
        LineColorType::Separate => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            let night_fg = c.bgr()?;
            let night_bg = c.bgr()?;
            (vec![bg, fg], Some(vec![night_bg, night_fg]))
        }
        LineColorType::DayTransparent => {
            let fg = c.bgr()?;
            let night_fg = c.bgr()?;
            let night_bg = c.bgr()?;
            (vec![Color::TRANSPARENT, fg], Some(vec![night_bg, night_fg]))
        }
        LineColorType::NightTransparent => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            let night_fg = c.bgr()?;
            (vec![bg, fg], Some(vec![Color::TRANSPARENT, night_fg]))
        }
        LineColorType::BorderlessSame => {
            let fg = c.bgr()?;
            (vec![Color::TRANSPARENT, fg], None)
        }
        LineColorType::Transparent => {
            let fg = c.bgr()?;
            let night_fg = c.bgr()?;
            (vec![Color::TRANSPARENT, fg], Some(vec![Color::TRANSPARENT, night_fg]))
        }
        LineColorType::BorderlessSeparate => {
            return Err(Error::UnsupportedColorType {
                kind: SectionKind::Lines,
                value: ctyp.wire(),
            });
        }
    };

    let packed = c.take(packed_len(32, rows, 1))?;
    let pixels = unpack(packed, 32, rows, 1)?;
    line.day_pattern = Some(Bitmap::new(32, rows, day_palette, pixels.clone())?);
    if let Some(palette) = night_palette {
        line.night_pattern = Some(Bitmap::new(32, rows, palette, pixels)?);
    }
    Ok(())
}

fn read_polygon(
    c: &mut Cursor<'_>,
    cp: Codepage,
    type_code: u32,
    subtype: u8,
) -> Result<Polygon, Error> {
    let first = c.u8()?;
    let ctyp = PolygonColorType::from_wire(first & 0x0F)?;

    let mut polygon = Polygon::builder()
        .type_code(type_code)
        .subtype(subtype)
        .extended_labels(first & 0x40 != 0)
        .build();

    let pattern_palettes = match ctyp {
        PolygonColorType::Same => {
            polygon.day_color = c.bgr()?;
            polygon.night_color = polygon.day_color;
            None
        }
        PolygonColorType::Separate | PolygonColorType::LegacySeparate => {
            polygon.day_color = c.bgr()?;
            polygon.night_color = c.bgr()?;
            None
        }
        PolygonColorType::Pattern => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            Some((vec![bg, fg], None))
        }
        PolygonColorType::PatternSeparate => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            let night_fg = c.bgr()?;
            let night_bg = c.bgr()?;
            Some((vec![bg, fg], Some(vec![night_bg, night_fg])))
        }
        PolygonColorType::PatternNightTransparent => {
            let fg = c.bgr()?;
            let bg = c.bgr()?;
            let night_fg = c.bgr()?;
            Some((vec![bg, fg], Some(vec![Color::TRANSPARENT, night_fg])))
        }
        PolygonColorType::PatternDayTransparent => {
            let fg = c.bgr()?;
            let night_fg = c.bgr()?;
            let night_bg = c.bgr()?;
            Some((vec![Color::TRANSPARENT, fg], Some(vec![night_bg, night_fg])))
        }
        PolygonColorType::PatternTransparent => {
            let fg = c.bgr()?;
            let night_fg = c.bgr()?;
            Some((vec![Color::TRANSPARENT, fg], Some(vec![Color::TRANSPARENT, night_fg])))
        }
    };

    if let Some((day_palette, night_palette)) = pattern_palettes {
        let packed = c.take(packed_len(32, 32, 1))?;
        let pixels = unpack(packed, 32, 32, 1)?;
        polygon.day_pattern = Some(Bitmap::new(32, 32, day_palette, pixels.clone())?);
        if let Some(palette) = night_palette {
            polygon.night_pattern = Some(Bitmap::new(32, 32, palette, pixels)?);
        }
    }

    if first & 0x10 != 0 {
        polygon.labels = labels::decode(c, cp)?;
    }
    if first & 0x20 != 0 {
        skip_text_block(c)?;
    }
    Ok(polygon)
}

// The text block's structure is only understood for points; for other kinds
// the bytes are consumed and dropped.
fn skip_text_block(c: &mut Cursor<'_>) -> Result<(), Error> {
    let flags = c.u8()?;
    if flags & 0x08 != 0 {
        c.take(3)?;
    }
    if flags & 0x10 != 0 {
        c.take(3)?;
    }
    Ok(())
}

fn warn_duplicates(kind: SectionKind, codes: impl Iterator<Item = (u32, u8)>) {
    for (type_code, subtype) in codes.duplicates() {
        warn!("duplicate {kind} type {type_code:#x} subtype {subtype:#x}");
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::error::Error;
    use crate::typ::typecode;

    /// A minimal header: signature, version 1, codepage 1252, FID 3511,
    /// PID 1, every section empty.
    pub(crate) fn header_only() -> Vec<u8> {
        let mut buf = vec![0u8; 0x5B];
        buf[0x00] = 0x5B;
        buf[0x02..0x0C].copy_from_slice(b"GARMIN TYP");
        buf[0x0C..0x0E].copy_from_slice(&1u16.to_le_bytes());
        buf[0x15..0x17].copy_from_slice(&1252u16.to_le_bytes());
        buf[0x2F..0x31].copy_from_slice(&1u16.to_le_bytes());
        buf[0x31..0x33].copy_from_slice(&3511u16.to_le_bytes());
        buf
    }

    #[test]
    fn header_only_file() {
        let (typ, issues) = Reader::new(&header_only()).parse().unwrap();
        assert!(issues.is_empty());
        assert_eq!(typ.header.version, 1);
        assert_eq!(typ.header.codepage, 1252);
        assert_eq!(typ.header.fid, 3511);
        assert_eq!(typ.header.pid, 1);
        assert!(typ.points.is_empty());
        assert!(typ.lines.is_empty());
        assert!(typ.polygons.is_empty());
    }

    #[test]
    fn missing_signature_is_fatal() {
        let mut buf = header_only();
        buf[0x02] = b'X';
        assert!(matches!(Reader::new(&buf).parse(), Err(Error::InvalidSignature)));
        assert!(matches!(Reader::new(&[]).parse(), Err(Error::InvalidSignature)));
    }

    #[test]
    fn short_header_is_truncated() {
        let buf = &header_only()[..0x40];
        assert!(matches!(Reader::new(buf).parse(), Err(Error::Truncated { .. })));
    }

    #[test]
    fn corrupt_record_is_dropped_not_fatal() {
        // one point whose record offset points past the end of the buffer
        let mut buf = header_only();
        let array_offset = buf.len() as u32;
        buf[0x33..0x37].copy_from_slice(&array_offset.to_le_bytes());
        buf[0x37..0x39].copy_from_slice(&3u16.to_le_bytes());
        buf[0x39..0x3D].copy_from_slice(&3u32.to_le_bytes());
        buf[0x17..0x1B].copy_from_slice(&0xFFFFu32.to_le_bytes());
        buf.extend_from_slice(&typecode::encode(0x2F06).to_le_bytes());
        buf.push(0x00);

        let (typ, issues) = Reader::new(&buf).parse().unwrap();
        assert!(typ.points.is_empty());
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].error, Error::Truncated { .. }));
    }

    #[test]
    fn fractional_index_tail_is_ignored() {
        // array size 7 with modulo 3 still yields two entries; both point at
        // a record that is out of range, so both are reported
        let mut buf = header_only();
        let array_offset = buf.len() as u32;
        buf[0x33..0x37].copy_from_slice(&array_offset.to_le_bytes());
        buf[0x37..0x39].copy_from_slice(&3u16.to_le_bytes());
        buf[0x39..0x3D].copy_from_slice(&7u32.to_le_bytes());
        buf[0x17..0x1B].copy_from_slice(&0xFFFFu32.to_le_bytes());
        for _ in 0..3 {
            buf.extend_from_slice(&typecode::encode(0x2F06).to_le_bytes());
            buf.push(0x00);
        }
        let (typ, issues) = Reader::new(&buf).parse().unwrap();
        assert!(typ.points.is_empty());
        assert_eq!(issues.len(), 2);
    }
}
