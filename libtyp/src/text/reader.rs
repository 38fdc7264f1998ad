use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::tag_no_case;
use nom::character::complete::{char, digit1, hex_digit1};
use nom::combinator::{map_res, opt, verify};
use nom::sequence::preceded;
use nom::IResult;
use strum::EnumString;
use tracing::{debug, warn};

use crate::error::Error;
use crate::text::xpm::XpmBuilder;
use crate::typ::{Bitmap, Color, Header, Line, Point, Polygon, TypFile};

#[derive(EnumString, Debug, Eq, PartialEq, Copy, Clone)]
enum Section {
    #[strum(serialize = "_id")]
    Id,
    #[strum(serialize = "_point")]
    Point,
    #[strum(serialize = "_line")]
    Line,
    #[strum(serialize = "_polygon")]
    Polygon,
    #[strum(serialize = "end")]
    End,
}

#[derive(EnumString, Debug, Eq, PartialEq, Copy, Clone)]
enum Key {
    CodePage,
    FID,
    ProductCode,
    Type,
    SubType,
    String1,
    String2,
    String3,
    DayColor,
    NightColor,
    DayBorderColor,
    NightBorderColor,
    LineWidth,
    BorderWidth,
    DayXpm,
    NightXpm,
    IconXpm,
}

/// Parses the mkgmap text form into a [`TypFile`].
///
/// The grammar is deliberately forgiving: unknown sections and keys are
/// skipped, malformed numbers default to zero, and a broken XPM block only
/// discards that bitmap.
pub struct Reader<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over the complete text source.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self { lines: source.lines().collect(), pos: 0 }
    }

    /// Parses the source.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TextSyntax`] only when a section never closes.
    pub fn read(mut self) -> Result<TypFile, Error> {
        let mut typ = TypFile::new();
        let mut saw_id = false;

        while let Some(line) = self.next_content() {
            let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else {
                debug!("ignoring stray line {:?}", line);
                continue;
            };
            match Section::from_str(name) {
                Ok(Section::Id) => {
                    self.read_header(&mut typ.header)?;
                    saw_id = true;
                }
                Ok(Section::Point) => {
                    if !saw_id {
                        warn!("[_point] before [_id], header defaults apply");
                    }
                    let point = self.read_point()?;
                    typ.points.push(point);
                }
                Ok(Section::Line) => {
                    let parsed = self.read_line()?;
                    typ.lines.push(parsed);
                }
                Ok(Section::Polygon) => {
                    let polygon = self.read_polygon()?;
                    typ.polygons.push(polygon);
                }
                Ok(Section::End) => {}
                Err(_) => {
                    debug!("skipping unknown section [{name}]");
                    self.skip_to_end()?;
                }
            }
        }
        Ok(typ)
    }

    /// Next non-blank, non-comment line.
    fn next_content(&mut self) -> Option<&'a str> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim();
            self.pos += 1;
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            return Some(line);
        }
        None
    }

    fn peek_quoted(&self) -> Option<&'a str> {
        let line = self.lines.get(self.pos)?.trim();
        line.starts_with('"').then_some(line)
    }

    fn skip_to_end(&mut self) -> Result<(), Error> {
        let start = self.pos;
        while let Some(line) = self.next_content() {
            if line == "[end]" {
                return Ok(());
            }
        }
        Err(Error::TextSyntax { line: start, reason: "section never reaches [end]".into() })
    }

    fn read_header(&mut self, header: &mut Header) -> Result<(), Error> {
        let start = self.pos;
        while let Some(line) = self.next_content() {
            if line == "[end]" {
                return Ok(());
            }
            let Some((key, value)) = split_key_value(line) else { continue };
            match Key::from_str(key) {
                Ok(Key::CodePage) => header.codepage = lenient_number(value) as u16,
                Ok(Key::FID) => header.fid = lenient_number(value) as u16,
                Ok(Key::ProductCode) => header.pid = lenient_number(value) as u16,
                _ => debug!("ignoring key {key:?} in [_id]"),
            }
        }
        Err(Error::TextSyntax { line: start, reason: "[_id] never reaches [end]".into() })
    }

    fn read_point(&mut self) -> Result<Point, Error> {
        let mut point = Point::default();
        let mut raw = RawType::default();
        let start = self.pos;
        while let Some(line) = self.next_content() {
            if line == "[end]" {
                (point.type_code, point.subtype) = raw.normalize();
                return Ok(point);
            }
            let Some((key, value)) = split_key_value(line) else { continue };
            match Key::from_str(key) {
                Ok(Key::Type) => raw.type_code = lenient_number(value),
                Ok(Key::SubType) => raw.subtype = lenient_number(value),
                Ok(Key::String1 | Key::String2 | Key::String3) => {
                    if let Some((lang, text)) = parse_label(value) {
                        point.labels.set(lang, text);
                    }
                }
                Ok(Key::DayColor) => point.day_color = lenient_color(value),
                Ok(Key::NightColor) => point.night_color = lenient_color(value),
                Ok(Key::DayXpm | Key::IconXpm) => point.day_icon = self.collect_xpm(value),
                Ok(Key::NightXpm) => point.night_icon = self.collect_xpm(value),
                _ => debug!("ignoring key {key:?} in [_point]"),
            }
        }
        Err(Error::TextSyntax { line: start, reason: "[_point] never reaches [end]".into() })
    }

    fn read_line(&mut self) -> Result<Line, Error> {
        let mut parsed = Line::default();
        let mut raw = RawType::default();
        let start = self.pos;
        while let Some(line) = self.next_content() {
            if line == "[end]" {
                (parsed.type_code, parsed.subtype) = raw.normalize();
                return Ok(parsed);
            }
            let Some((key, value)) = split_key_value(line) else { continue };
            match Key::from_str(key) {
                Ok(Key::Type) => raw.type_code = lenient_number(value),
                Ok(Key::SubType) => raw.subtype = lenient_number(value),
                Ok(Key::String1 | Key::String2 | Key::String3) => {
                    if let Some((lang, text)) = parse_label(value) {
                        parsed.labels.set(lang, text);
                    }
                }
                Ok(Key::LineWidth) => parsed.line_width = lenient_number(value) as u8,
                Ok(Key::BorderWidth) => parsed.border_width = lenient_number(value) as u8,
                Ok(Key::DayColor) => parsed.day_color = lenient_color(value),
                Ok(Key::NightColor) => parsed.night_color = lenient_color(value),
                Ok(Key::DayBorderColor) => parsed.day_border_color = lenient_color(value),
                Ok(Key::NightBorderColor) => parsed.night_border_color = lenient_color(value),
                Ok(Key::DayXpm | Key::IconXpm) => parsed.day_pattern = self.collect_xpm(value),
                Ok(Key::NightXpm) => parsed.night_pattern = self.collect_xpm(value),
                _ => debug!("ignoring key {key:?} in [_line]"),
            }
        }
        Err(Error::TextSyntax { line: start, reason: "[_line] never reaches [end]".into() })
    }

    fn read_polygon(&mut self) -> Result<Polygon, Error> {
        let mut polygon = Polygon::default();
        let mut raw = RawType::default();
        let start = self.pos;
        while let Some(line) = self.next_content() {
            if line == "[end]" {
                (polygon.type_code, polygon.subtype) = raw.normalize();
                return Ok(polygon);
            }
            let Some((key, value)) = split_key_value(line) else { continue };
            match Key::from_str(key) {
                Ok(Key::Type) => raw.type_code = lenient_number(value),
                Ok(Key::SubType) => raw.subtype = lenient_number(value),
                Ok(Key::String1 | Key::String2 | Key::String3) => {
                    if let Some((lang, text)) = parse_label(value) {
                        polygon.labels.set(lang, text);
                    }
                }
                Ok(Key::DayColor) => polygon.day_color = lenient_color(value),
                Ok(Key::NightColor) => polygon.night_color = lenient_color(value),
                Ok(Key::DayXpm | Key::IconXpm) => polygon.day_pattern = self.collect_xpm(value),
                Ok(Key::NightXpm) => polygon.night_pattern = self.collect_xpm(value),
                _ => debug!("ignoring key {key:?} in [_polygon]"),
            }
        }
        Err(Error::TextSyntax { line: start, reason: "[_polygon] never reaches [end]".into() })
    }

    /// Consumes the quoted block following an XPM header line. A failed
    /// build discards the bitmap but never the feature.
    fn collect_xpm(&mut self, header: &str) -> Option<Bitmap> {
        let mut builder = match XpmBuilder::new(header) {
            Ok(builder) => Some(builder),
            Err(e) => {
                warn!("discarding XPM block: {e}");
                None
            }
        };
        while let Some(line) = self.peek_quoted() {
            if let Some(builder) = builder.as_mut() {
                builder.add_line(line);
            }
            self.pos += 1;
        }
        match builder?.build() {
            Ok(bitmap) => Some(bitmap),
            Err(e) => {
                warn!("discarding XPM block: {e}");
                None
            }
        }
    }
}

/// The `Type`/`SubType` pair as written. A combined value over 0xFF already
/// carries its subtype in the low byte; a small value is the bare type and
/// is shifted up around the separate subtype.
#[derive(Default)]
struct RawType {
    type_code: u32,
    subtype: u32,
}

impl RawType {
    fn normalize(&self) -> (u32, u8) {
        let subtype = (self.subtype & 0xFF) as u8;
        if self.type_code > 0xFF {
            (self.type_code, subtype)
        } else {
            ((self.type_code << 8) | u32::from(subtype), subtype)
        }
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn number(input: &str) -> IResult<&str, u32> {
    alt((
        preceded(tag_no_case("0x"), map_res(hex_digit1, |s| u32::from_str_radix(s, 16))),
        map_res(digit1, str::parse),
    ))(input)
}

/// mkgmap tolerates malformed numbers by treating them as zero.
fn lenient_number(input: &str) -> u32 {
    number(input.trim()).map_or_else(
        |e| {
            warn!("malformed number {input:?} treated as 0: {e}");
            0
        },
        |(_, n)| n,
    )
}

fn color(input: &str) -> IResult<&str, Color> {
    let (input, _) = char('#')(input)?;
    let (input, hex) = map_res(verify(hex_digit1, |s: &str| s.len() == 6), |s| {
        u32::from_str_radix(s, 16)
    })(input)?;
    Ok((input, Color::rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)))
}

fn lenient_color(input: &str) -> Color {
    color(input.trim()).map_or_else(
        |e| {
            warn!("malformed color {input:?} ignored: {e}");
            Color::default()
        },
        |(_, c)| c,
    )
}

/// A label value: `LANGCODE,TEXT` with an optionally `0x`-prefixed hex
/// language code.
fn parse_label(value: &str) -> Option<(u8, String)> {
    let (lang, text) = value.split_once(',')?;
    let lang = lang.trim();
    let parsed: IResult<&str, u8> = preceded(
        opt(tag_no_case("0x")),
        map_res(hex_digit1, |s| u8::from_str_radix(s, 16)),
    )(lang);
    match parsed {
        Ok((_, lang)) => Some((lang, text.trim().to_owned())),
        Err(_) => {
            warn!("malformed label language code {lang:?}, entry skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::typ::Color;

    #[test]
    fn reads_header_section() {
        let typ = Reader::new("[_id]\nCodePage=1252\nFID=3511\nProductCode=1\n[end]\n")
            .read()
            .unwrap();
        assert_eq!(typ.header.codepage, 1252);
        assert_eq!(typ.header.fid, 3511);
        assert_eq!(typ.header.pid, 1);
    }

    #[test]
    fn reads_point_with_label_and_color() {
        let source = "[_point]\nType=0x2f06\nSubType=0x00\nString1=0x04,Trail Junction\nDayColor=#ff0000\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        assert_eq!(typ.points.len(), 1);
        let point = &typ.points[0];
        assert_eq!(point.type_code, 0x2F06);
        assert_eq!(point.subtype, 0);
        assert_eq!(point.labels.get(0x04), Some("Trail Junction"));
        assert_eq!(point.day_color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn small_type_combines_with_subtype() {
        let typ = Reader::new("[_line]\nType=0x05\nSubType=0x01\n[end]\n").read().unwrap();
        assert_eq!(typ.lines[0].type_code, 0x501);
        assert_eq!(typ.lines[0].subtype, 0x01);
    }

    #[test]
    fn reads_point_with_xpm() {
        let source = concat!(
            "[_point]\n",
            "Type=0x100\n",
            "DayXpm=\"8 8 2 1\"\n",
            "\"! c #ff0000\"\n",
            "\"  c none\"\n",
            "\"!!!!!!!!\"\n",
            "\"!      !\"\n",
            "\"! !!!! !\"\n",
            "\"! !!!! !\"\n",
            "\"! !!!! !\"\n",
            "\"! !!!! !\"\n",
            "\"!      !\"\n",
            "\"!!!!!!!!\"\n",
            "[end]\n",
        );
        let typ = Reader::new(source).read().unwrap();
        let icon = typ.points[0].day_icon.as_ref().unwrap();
        assert_eq!((icon.width(), icon.height()), (8, 8));
        assert_eq!(icon.palette()[0], Color::rgb(255, 0, 0));
        assert!(icon.palette()[1].is_transparent());
        assert_eq!(icon.pixels()[..8], [0; 8]);
        assert_eq!(icon.pixels()[8..16], [0, 1, 1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn reads_line_widths_and_colors() {
        let source = "[_line]\nType=0x100\nLineWidth=4\nBorderWidth=2\nDayColor=#dd7755\nNightColor=#dd7755\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        let line = &typ.lines[0];
        assert_eq!(line.line_width, 4);
        assert_eq!(line.border_width, 2);
        assert_eq!(line.day_color, Color::rgb(0xDD, 0x77, 0x55));
    }

    #[test]
    fn legacy_icon_key_is_day_icon() {
        let source = "[_point]\nType=0x100\nIconXpm=\"1 1 1 1\"\n\"! c #102030\"\n\"!\"\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        assert!(typ.points[0].day_icon.is_some());
        assert!(typ.points[0].night_icon.is_none());
    }

    #[test]
    fn unknown_sections_and_keys_are_skipped() {
        let source = "[_strange]\nFoo=1\n[end]\n\n[_point]\nType=0x100\nNoSuchKey=9\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        assert_eq!(typ.points.len(), 1);
    }

    #[test]
    fn malformed_numbers_default_to_zero() {
        let typ = Reader::new("[_line]\nType=bogus\nLineWidth=wide\n[end]\n").read().unwrap();
        assert_eq!(typ.lines[0].type_code, 0);
        assert_eq!(typ.lines[0].line_width, 0);
    }

    #[test]
    fn broken_xpm_keeps_the_feature() {
        let source =
            "[_point]\nType=0x100\nDayXpm=\"2 2 1 1\"\n\"! c #ff0000\"\n\"!!\"\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        assert_eq!(typ.points.len(), 1);
        assert!(typ.points[0].day_icon.is_none());
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let source = "# comment\n; other comment\n\n[_id]\nCodePage=1250\n[end]\n";
        let typ = Reader::new(source).read().unwrap();
        assert_eq!(typ.header.codepage, 1250);
    }

    #[test]
    fn unterminated_section_is_an_error() {
        assert!(Reader::new("[_point]\nType=0x100\n").read().is_err());
    }
}
