//! The multi-language label block.
//!
//! The block is a length prefix followed by `lang-code, string, 0x00`
//! entries. The prefix is one byte when its low bit is set, two bytes
//! otherwise, and its value is twice the payload size plus the prefix size
//! itself: every consumed payload byte pays two ticks off a counter that
//! starts at `prefix - prefix_size` and must land exactly on zero.

use tracing::warn;

use crate::binary::Cursor;
use crate::codepage::Codepage;
use crate::error::Error;
use crate::typ::Labels;

/// Language codes above this are not real languages; hitting one mid-block
/// means the length accounting drifted or the block ended early.
const MAX_LANG: u8 = 0x40;

/// Seen as a language code in some legacy files; tolerated.
const LEGACY_LANG: u8 = 0xBC;

/// Decodes a label block at the cursor position.
///
/// # Errors
///
/// Fails with [`Error::LabelBlockCorrupt`] if the counter underflows or the
/// buffer ends before a string terminator.
pub(crate) fn decode(c: &mut Cursor<'_>, cp: Codepage) -> Result<Labels, Error> {
    let first = read(c)?;
    let (prefix_size, prefix) = if first & 0x01 != 0 {
        (1i32, i32::from(first))
    } else {
        (2, i32::from(first) | (i32::from(read(c)?) << 8))
    };
    let mut remaining = prefix - prefix_size;

    let mut labels = Labels::new();
    while remaining > 0 {
        let lang = read(c)?;
        remaining -= 2;
        if lang > MAX_LANG && lang != LEGACY_LANG {
            // Not a language code; assume the block ended one byte earlier.
            warn!("implausible language code {lang:#04x}, stopping label scan");
            c.back(1);
            break;
        }
        let mut raw = Vec::new();
        loop {
            let b = read(c)?;
            remaining -= 2;
            if b == 0 {
                break;
            }
            if remaining <= 0 {
                return Err(Error::LabelBlockCorrupt);
            }
            raw.push(b);
        }
        if remaining < 0 {
            return Err(Error::LabelBlockCorrupt);
        }
        let text = cp.decode(&raw);
        if looks_spurious(&text) {
            warn!("discarding implausible label for language {lang:#04x}");
        } else {
            labels.set(lang, text);
        }
    }
    if remaining < 0 {
        return Err(Error::LabelBlockCorrupt);
    }
    Ok(labels)
}

/// Encodes a label block, choosing the narrowest length prefix.
///
/// # Errors
///
/// Fails with [`Error::UnrepresentableFeature`] if the payload exceeds what
/// a two-byte prefix can count.
pub(crate) fn encode(labels: &Labels, cp: Codepage, out: &mut Vec<u8>) -> Result<(), Error> {
    let mut data = Vec::new();
    for (lang, text) in labels.iter() {
        data.push(lang);
        data.extend_from_slice(&cp.encode(text));
        data.push(0);
    }

    let doubled = data.len() * 2;
    if doubled + 1 <= 0xFF {
        // one-byte prefix, low bit set
        out.push((doubled + 1) as u8);
    } else {
        let prefix = u16::try_from(doubled + 2).map_err(|_| Error::UnrepresentableFeature {
            reason: format!("label block payload of {} bytes exceeds the format limit", data.len()),
        })?;
        // two-byte prefix, low bit clear; 2 * len + 2 is always even
        out.extend_from_slice(&prefix.to_le_bytes());
    }
    out.extend_from_slice(&data);
    Ok(())
}

// Any truncation inside a label block is corruption of the block itself.
fn read(c: &mut Cursor<'_>) -> Result<u8, Error> {
    c.u8().map_err(|_| Error::LabelBlockCorrupt)
}

/// A real label is mostly printable; a block that drifted out of sync
/// decodes to control-character soup.
fn looks_spurious(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let unprintable = text.chars().filter(|c| c.is_control()).count();
    unprintable * 10 > total * 3
}

#[cfg(test)]
mod tests {
    use super::{decode, encode};
    use crate::binary::Cursor;
    use crate::codepage::Codepage;
    use crate::error::Error;
    use crate::typ::Labels;

    fn roundtrip(labels: &Labels, cp: Codepage) -> Labels {
        let mut wire = Vec::new();
        encode(labels, cp, &mut wire).unwrap();
        decode(&mut Cursor::new(&wire, 0), cp).unwrap()
    }

    #[test]
    fn single_entry_one_byte_prefix() {
        let mut labels = Labels::new();
        labels.set(0x04, "Trail Junction");
        let mut wire = Vec::new();
        encode(&labels, Codepage::Cp1252, &mut wire).unwrap();
        // payload: lang + 14 chars + terminator = 16 bytes, prefix 2*16+1
        assert_eq!(wire[0], 33);
        assert_eq!(wire[1], 0x04);
        assert_eq!(&wire[2..16], b"Trail Junction");
        assert_eq!(wire[16], 0);
        assert_eq!(roundtrip(&labels, Codepage::Cp1252), labels);
    }

    #[test]
    fn hungarian_body_bytes_in_cp1250() {
        let mut labels = Labels::new();
        labels.set(0x13, "Főváros");
        let mut wire = Vec::new();
        encode(&labels, Codepage::Cp1250, &mut wire).unwrap();
        assert_eq!(&wire[2..], [0x46, 0xF5, 0x76, 0xE1, 0x72, 0x6F, 0x73, 0x00]);
        assert_eq!(roundtrip(&labels, Codepage::Cp1250), labels);
    }

    #[test]
    fn widest_one_byte_prefix() {
        // 125-char string: payload 1 + 125 + 1 = 127 bytes, prefix 255
        let mut labels = Labels::new();
        labels.set(0x00, "x".repeat(125));
        let mut wire = Vec::new();
        encode(&labels, Codepage::Cp1252, &mut wire).unwrap();
        assert_eq!(wire[0], 0xFF);
        assert_eq!(wire.len(), 1 + 127);
        assert_eq!(roundtrip(&labels, Codepage::Cp1252), labels);
    }

    #[test]
    fn prefix_switches_to_two_bytes_at_128_payload_bytes() {
        // 126-char string: payload 128 bytes, 2*128+1 overflows one byte,
        // so the prefix becomes 2*128+2 = 258 little-endian
        let mut labels = Labels::new();
        labels.set(0x00, "x".repeat(126));
        let mut wire = Vec::new();
        encode(&labels, Codepage::Cp1252, &mut wire).unwrap();
        assert_eq!(wire[0], 0x02);
        assert_eq!(wire[1], 0x01);
        assert_eq!(wire.len(), 2 + 128);
        assert_eq!(roundtrip(&labels, Codepage::Cp1252), labels);
    }

    #[test]
    fn many_entries_roundtrip() {
        let labels: Labels = (0u8..16)
            .map(|lang| (lang, format!("label {lang}")))
            .collect();
        assert_eq!(roundtrip(&labels, Codepage::Cp1252), labels);
        assert_eq!(roundtrip(&labels, Codepage::Utf8), labels);
    }

    #[test]
    fn unterminated_string_is_corrupt() {
        // prefix says 4 payload bytes but the string never terminates
        let wire = [0x09, 0x04, b'a', b'b', b'c'];
        let err = decode(&mut Cursor::new(&wire, 0), Codepage::Cp1252).unwrap_err();
        assert!(matches!(err, Error::LabelBlockCorrupt));
    }

    #[test]
    fn truncated_block_is_corrupt() {
        let wire = [0x09, 0x04, b'a'];
        let err = decode(&mut Cursor::new(&wire, 0), Codepage::Cp1252).unwrap_err();
        assert!(matches!(err, Error::LabelBlockCorrupt));
    }

    #[test]
    fn implausible_language_code_stops_scan() {
        // one good entry, then a byte that cannot start an entry
        let wire = [0x0D, 0x04, b'o', b'k', 0x00, 0x7F];
        let labels = decode(&mut Cursor::new(&wire, 0), Codepage::Cp1252).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get(0x04), Some("ok"));
    }

    #[test]
    fn empty_map_encodes_minimal_block() {
        let labels = Labels::new();
        let mut wire = Vec::new();
        encode(&labels, Codepage::Cp1252, &mut wire).unwrap();
        assert_eq!(wire, [0x01]);
        assert_eq!(roundtrip(&labels, Codepage::Cp1252), labels);
    }
}
