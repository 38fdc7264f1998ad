use std::io::Write;

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).expect("usage: typ_to_text <file.typ>");
    let bytes = std::fs::read(&path)?;
    let typ = libtyp::parse_binary(&bytes)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    libtyp::write_text(&typ, &mut out)?;
    out.flush()?;
    Ok(())
}
