use libtyp::{lang, Color, Header, Line, Point, TypFile};

/// Builds a tiny two-feature TYP file from scratch and writes it out.
fn main() -> anyhow::Result<()> {
    let mut typ = TypFile::new();
    typ.header = Header::builder().codepage(1252).fid(3511).pid(1).build();

    let mut junction = Point::builder().type_code(0x2F06).build();
    junction.labels.set(lang::ENGLISH, "Trail Junction");
    junction.day_color = Color::rgb(255, 0, 0);
    typ.points.push(junction);

    let mut trail = Line::builder().type_code(0x0100).build();
    trail.labels.set(lang::ENGLISH, "Trail");
    trail.day_color = Color::rgb(0x60, 0x30, 0x00);
    trail.line_width = 2;
    typ.lines.push(trail);

    let mut out = std::fs::File::create("example.typ")?;
    libtyp::write_binary(&typ, &mut out)?;
    println!("wrote example.typ");
    Ok(())
}
