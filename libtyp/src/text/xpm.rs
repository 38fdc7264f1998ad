//! The character-indexed bitmap blocks of the text form.
//!
//! An XPM block opens with a quoted `"width height ncolors cpp"` header,
//! followed by one quoted palette line per color and one quoted pixel line
//! per row. Palette characters are assigned deterministically from a fixed
//! set; palettes too large for two-character codes cannot be written.

use std::io::Write;

use nom::character::complete::{char, digit1, space1};
use nom::combinator::map_res;
use nom::sequence::delimited;
use nom::IResult;
use tracing::warn;

use crate::error::Error;
use crate::typ::{Bitmap, Color};

/// Every printable ASCII character except the quote, in assignment order.
const CHARSET: &[u8] =
    br##"!#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\]^_`abcdefghijklmnopqrstuvwxyz{|}~"##;

/// Palette-code width for a palette size.
fn chars_per_pixel(colors: usize) -> Result<usize, Error> {
    if colors <= CHARSET.len() {
        Ok(1)
    } else if colors <= 255 {
        Ok(2)
    } else {
        Err(Error::UnrepresentableBitmap { colors })
    }
}

/// The deterministic character code of palette slot `index`.
fn palette_code(index: usize, cpp: usize) -> String {
    if cpp == 1 {
        char::from(CHARSET[index]).to_string()
    } else {
        let hi = char::from(CHARSET[index / CHARSET.len()]);
        let lo = char::from(CHARSET[index % CHARSET.len()]);
        format!("{hi}{lo}")
    }
}

/// Writes a bitmap as an XPM block tagged `tag`.
///
/// # Errors
///
/// Fails with [`Error::UnrepresentableBitmap`] for palettes over 255 colors
/// and with [`Error::Io`] when the sink fails.
pub(crate) fn write_xpm(out: &mut impl Write, tag: &str, bitmap: &Bitmap) -> Result<(), Error> {
    let cpp = chars_per_pixel(bitmap.palette().len())?;
    writeln!(
        out,
        "{tag}=\"{} {} {} {cpp}\"",
        bitmap.width(),
        bitmap.height(),
        bitmap.palette().len()
    )?;

    for (i, color) in bitmap.palette().iter().enumerate() {
        let code = palette_code(i, cpp);
        if color.is_transparent() {
            writeln!(out, "\"{code} c none\"")?;
        } else {
            writeln!(out, "\"{code} c #{:02x}{:02x}{:02x}\"", color.r, color.g, color.b)?;
        }
    }

    let width = usize::from(bitmap.width());
    for row in bitmap.pixels().chunks(width.max(1)) {
        let mut line = String::with_capacity(width * cpp + 2);
        line.push('"');
        for &pixel in row {
            line.push_str(&palette_code(usize::from(pixel), cpp));
        }
        line.push('"');
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn quoted_quad(input: &str) -> IResult<&str, (u16, u16, usize, usize)> {
    let number_u16 = |i| map_res(digit1, str::parse::<u16>)(i);
    let number = |i| map_res(digit1, str::parse::<usize>)(i);
    let result = delimited(
        char('"'),
        |i| {
            let (i, width) = number_u16(i)?;
            let (i, _) = space1(i)?;
            let (i, height) = number_u16(i)?;
            let (i, _) = space1(i)?;
            let (i, colors) = number(i)?;
            let (i, _) = space1(i)?;
            let (i, cpp) = number(i)?;
            Ok((i, (width, height, colors, cpp)))
        },
        char('"'),
    )(input);
    result
}

/// Accumulates the quoted lines of an XPM block and assembles the bitmap.
pub(crate) struct XpmBuilder {
    width: u16,
    height: u16,
    colors: usize,
    cpp: usize,
    lines: Vec<String>,
}

impl XpmBuilder {
    /// Starts a builder from the quoted header value, e.g. `"8 8 2 1"`.
    pub(crate) fn new(header: &str) -> Result<Self, Error> {
        let (_, (width, height, colors, cpp)) =
            quoted_quad(header.trim()).map_err(|_| Error::CorruptBitmap {
                reason: format!("malformed XPM header {header:?}"),
            })?;
        Ok(Self { width, height, colors, cpp, lines: Vec::new() })
    }

    /// Adds one quoted palette or pixel line.
    pub(crate) fn add_line(&mut self, line: &str) {
        self.lines.push(line.trim().trim_matches('"').to_owned());
    }

    /// Assembles the bitmap from the accumulated lines.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::CorruptBitmap`] when the line count or line
    /// lengths do not match the header.
    pub(crate) fn build(self) -> Result<Bitmap, Error> {
        if self.lines.len() != self.colors + usize::from(self.height) {
            return Err(Error::CorruptBitmap {
                reason: format!(
                    "XPM block has {} lines, expected {} palette + {} pixel rows",
                    self.lines.len(),
                    self.colors,
                    self.height
                ),
            });
        }
        if self.cpp == 0 || self.cpp > 2 {
            return Err(Error::CorruptBitmap {
                reason: format!("unsupported {} characters per pixel", self.cpp),
            });
        }

        let mut codes = Vec::with_capacity(self.colors);
        let mut palette = Vec::with_capacity(self.colors);
        for line in &self.lines[..self.colors] {
            let (code, color) = parse_palette_line(line, self.cpp)?;
            codes.push(code);
            palette.push(color);
        }

        let width = usize::from(self.width);
        let mut pixels = Vec::with_capacity(width * usize::from(self.height));
        for (row, line) in self.lines[self.colors..].iter().enumerate() {
            let expected = width * self.cpp;
            if line.len() < expected {
                return Err(Error::CorruptBitmap {
                    reason: format!("XPM pixel row {row} is {} chars, expected {expected}", line.len()),
                });
            }
            for col in 0..width {
                let code = &line[col * self.cpp..(col + 1) * self.cpp];
                match codes.iter().position(|c| c == code) {
                    Some(index) => pixels.push(index as u8),
                    None => {
                        warn!("unknown XPM code {code:?} in row {row}, using palette slot 0");
                        pixels.push(0);
                    }
                }
            }
        }
        Bitmap::new(self.width, self.height, palette, pixels)
    }
}

fn parse_palette_line(line: &str, cpp: usize) -> Result<(String, Color), Error> {
    let malformed = || Error::CorruptBitmap { reason: format!("malformed XPM palette line {line:?}") };
    if line.len() < cpp {
        return Err(malformed());
    }
    let code = line[..cpp].to_owned();
    let mut parts = line[cpp..].split_whitespace();
    if parts.next() != Some("c") {
        return Err(malformed());
    }
    let value = parts.next().ok_or_else(malformed)?;
    let color = if value.eq_ignore_ascii_case("none") {
        Color::TRANSPARENT
    } else if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 {
            return Err(malformed());
        }
        let parse = |s| u8::from_str_radix(s, 16).map_err(|_| malformed());
        Color::rgb(parse(&hex[0..2])?, parse(&hex[2..4])?, parse(&hex[4..6])?)
    } else {
        return Err(malformed());
    };
    Ok((code, color))
}

#[cfg(test)]
mod tests {
    use super::{chars_per_pixel, palette_code, write_xpm, XpmBuilder, CHARSET};
    use crate::error::Error;
    use crate::typ::{Bitmap, Color};

    fn build(header: &str, lines: &[&str]) -> Result<Bitmap, Error> {
        let mut builder = XpmBuilder::new(header)?;
        for line in lines {
            builder.add_line(line);
        }
        builder.build()
    }

    #[test]
    fn charset_has_ninety_three_characters() {
        assert_eq!(CHARSET.len(), 93);
        assert!(!CHARSET.contains(&b'"'));
    }

    #[test]
    fn reads_a_small_icon() {
        let bitmap = build(
            "\"4 2 2 1\"",
            &["\"! c #ff0000\"", "\"  c none\"", "\"!  !\"", "\" !! \""],
        )
        .unwrap();
        assert_eq!(bitmap.width(), 4);
        assert_eq!(bitmap.height(), 2);
        assert_eq!(bitmap.palette(), [Color::rgb(255, 0, 0), Color::TRANSPARENT]);
        assert_eq!(bitmap.pixels(), [0, 1, 1, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn roundtrips_through_text() {
        let palette = vec![Color::TRANSPARENT, Color::rgb(0x12, 0x34, 0x56), Color::rgb(9, 8, 7)];
        let pixels: Vec<u8> = (0..12).map(|i| i % 3).collect();
        let bitmap = Bitmap::new(4, 3, palette, pixels).unwrap();

        let mut out = Vec::new();
        write_xpm(&mut out, "DayXpm", &bitmap).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap().strip_prefix("DayXpm=").unwrap();
        let rebuilt = build(header, &lines.collect::<Vec<_>>()).unwrap();
        assert_eq!(rebuilt, bitmap);
    }

    #[test]
    fn two_character_codes_above_charset_size() {
        assert_eq!(chars_per_pixel(93).unwrap(), 1);
        assert_eq!(chars_per_pixel(94).unwrap(), 2);
        assert_eq!(palette_code(0, 2), "!!");
        assert_eq!(palette_code(93, 2), "#!");
        assert_eq!(palette_code(94, 2), "##");
        assert!(matches!(
            chars_per_pixel(256),
            Err(Error::UnrepresentableBitmap { colors: 256 })
        ));
    }

    #[test]
    fn mismatched_line_count_fails() {
        assert!(build("\"4 2 2 1\"", &["\"! c #ff0000\"", "\"  c none\"", "\"!  !\""]).is_err());
    }

    #[test]
    fn short_pixel_row_fails() {
        assert!(build("\"4 1 1 1\"", &["\"! c #ff0000\"", "\"!!\""]).is_err());
    }
}
