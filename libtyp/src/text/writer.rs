use std::io::Write;

use crate::error::Error;
use crate::text::xpm::write_xpm;
use crate::typ::{Bitmap, Color, Labels, Line, Point, Polygon, TypFile};

/// Emits a [`TypFile`] in the mkgmap text form: the `[_id]` section first,
/// then every point, line and polygon in catalog order.
pub struct Writer<W: Write> {
    out: W,
}

impl<W: Write> Writer<W> {
    /// Creates a text writer over a sink.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes the complete catalog.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnrepresentableBitmap`] if an icon palette
    /// exceeds the XPM character set and with [`Error::Io`] on sink failure.
    pub fn write(&mut self, typ: &TypFile) -> Result<(), Error> {
        self.write_header(typ)?;
        for point in &typ.points {
            self.write_point(point)?;
        }
        for line in &typ.lines {
            self.write_line(line)?;
        }
        for polygon in &typ.polygons {
            self.write_polygon(polygon)?;
        }
        Ok(())
    }

    fn write_header(&mut self, typ: &TypFile) -> Result<(), Error> {
        writeln!(self.out, "[_id]")?;
        if typ.header.codepage != 0 {
            writeln!(self.out, "CodePage={}", typ.header.codepage)?;
        }
        if typ.header.fid != 0 {
            writeln!(self.out, "FID={}", typ.header.fid)?;
        }
        if typ.header.pid != 0 {
            writeln!(self.out, "ProductCode={}", typ.header.pid)?;
        }
        self.end_section()
    }

    fn write_point(&mut self, point: &Point) -> Result<(), Error> {
        writeln!(self.out, "[_point]")?;
        self.write_type(point.type_code, point.subtype)?;
        self.write_labels(&point.labels)?;
        self.write_color("DayColor", point.day_color)?;
        self.write_color("NightColor", point.night_color)?;
        self.write_bitmaps(point.day_icon.as_ref(), point.night_icon.as_ref())?;
        self.end_section()
    }

    fn write_line(&mut self, line: &Line) -> Result<(), Error> {
        writeln!(self.out, "[_line]")?;
        self.write_type(line.type_code, line.subtype)?;
        self.write_labels(&line.labels)?;
        self.write_color("DayBorderColor", line.day_border_color)?;
        self.write_color("DayColor", line.day_color)?;
        self.write_color("NightBorderColor", line.night_border_color)?;
        self.write_color("NightColor", line.night_color)?;
        if line.line_width > 0 {
            writeln!(self.out, "LineWidth={}", line.line_width)?;
        }
        if line.border_width > 0 {
            writeln!(self.out, "BorderWidth={}", line.border_width)?;
        }
        self.write_bitmaps(line.day_pattern.as_ref(), line.night_pattern.as_ref())?;
        self.end_section()
    }

    fn write_polygon(&mut self, polygon: &Polygon) -> Result<(), Error> {
        writeln!(self.out, "[_polygon]")?;
        self.write_type(polygon.type_code, polygon.subtype)?;
        self.write_labels(&polygon.labels)?;
        self.write_color("DayColor", polygon.day_color)?;
        self.write_color("NightColor", polygon.night_color)?;
        self.write_bitmaps(polygon.day_pattern.as_ref(), polygon.night_pattern.as_ref())?;
        self.end_section()
    }

    fn write_type(&mut self, type_code: u32, subtype: u8) -> Result<(), Error> {
        writeln!(self.out, "Type=0x{type_code:x}")?;
        if subtype != 0 {
            writeln!(self.out, "SubType=0x{subtype:x}")?;
        }
        Ok(())
    }

    fn write_labels(&mut self, labels: &Labels) -> Result<(), Error> {
        for (lang, text) in labels.iter() {
            writeln!(self.out, "String1=0x{lang:02x},{text}")?;
        }
        Ok(())
    }

    fn write_color(&mut self, key: &str, color: Color) -> Result<(), Error> {
        if !color.is_unset() {
            writeln!(self.out, "{key}=#{:02x}{:02x}{:02x}", color.r, color.g, color.b)?;
        }
        Ok(())
    }

    /// Day first, then night unless it aliases the same bitmap.
    fn write_bitmaps(&mut self, day: Option<&Bitmap>, night: Option<&Bitmap>) -> Result<(), Error> {
        if let Some(bitmap) = day {
            write_xpm(&mut self.out, "DayXpm", bitmap)?;
        }
        if let Some(bitmap) = night {
            if day != Some(bitmap) {
                write_xpm(&mut self.out, "NightXpm", bitmap)?;
            }
        }
        Ok(())
    }

    fn end_section(&mut self) -> Result<(), Error> {
        writeln!(self.out, "[end]")?;
        writeln!(self.out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::typ::{Bitmap, Color, Header, Point, Polygon, TypFile};

    fn render(typ: &TypFile) -> String {
        let mut out = Vec::new();
        Writer::new(&mut out).write(typ).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn minimal_point_section() {
        let mut typ = TypFile::new();
        typ.header = Header::builder().codepage(0).build();
        let mut point = Point::builder().type_code(0x2F06).build();
        point.labels.set(0x04, "Trail Junction");
        point.day_color = Color::rgb(255, 0, 0);
        typ.points.push(point);

        let text = render(&typ);
        assert!(text.contains(
            "[_point]\nType=0x2f06\nString1=0x04,Trail Junction\nDayColor=#ff0000\n[end]\n"
        ));
    }

    #[test]
    fn id_section_comes_first() {
        let mut typ = TypFile::new();
        typ.header = Header::builder().codepage(1250).fid(42).pid(7).build();
        let text = render(&typ);
        assert!(text.starts_with("[_id]\nCodePage=1250\nFID=42\nProductCode=7\n[end]\n\n"));
    }

    #[test]
    fn subtype_only_when_nonzero() {
        let mut typ = TypFile::new();
        typ.polygons.push(Polygon::builder().type_code(0x501).subtype(1).build());
        typ.polygons.push(Polygon::builder().type_code(0x200).build());
        let text = render(&typ);
        assert!(text.contains("Type=0x501\nSubType=0x1\n"));
        assert!(text.contains("Type=0x200\n[end]"));
    }

    #[test]
    fn identical_night_bitmap_is_elided() {
        let bitmap = Bitmap::new(1, 1, vec![Color::rgb(1, 2, 3)], vec![0]).unwrap();
        let mut typ = TypFile::new();
        let mut point = Point::builder().type_code(0x100).build();
        point.day_icon = Some(bitmap.clone());
        point.night_icon = Some(bitmap);
        typ.points.push(point);
        let text = render(&typ);
        assert!(text.contains("DayXpm="));
        assert!(!text.contains("NightXpm="));
    }

    #[test]
    fn every_section_ends_with_a_blank_line() {
        let mut typ = TypFile::new();
        typ.points.push(Point::builder().type_code(0x100).build());
        let text = render(&typ);
        for section in text.split_inclusive("[end]\n\n") {
            assert!(section.ends_with("[end]\n\n"), "section {section:?}");
        }
    }
}
