use thiserror::Error;

use crate::typ::SectionKind;

#[derive(Error, Debug)]
#[non_exhaustive]
/// Possible `libtyp` errors
pub enum Error {
    /// The binary input does not carry the `GARMIN TYP` signature
    #[error("not a TYP file: missing GARMIN TYP signature")]
    InvalidSignature,
    /// A read would extend past the end of the input buffer
    #[error("truncated input: read past end of buffer at offset {offset:#x}")]
    Truncated {
        /// Absolute byte offset of the failed read
        offset: usize,
    },
    /// Bitmap byte count or pixel indices inconsistent with palette and dimensions
    #[error("corrupt bitmap: {reason}")]
    CorruptBitmap {
        /// What was inconsistent
        reason: String,
    },
    /// The label block's length counter cannot reach exactly zero
    #[error("corrupt label block: length counter cannot reach zero")]
    LabelBlockCorrupt,
    /// A line or polygon record carries a color-type byte outside the known set
    #[error("unsupported {kind} color type {value:#04x}")]
    UnsupportedColorType {
        /// Section kind of the offending record
        kind: SectionKind,
        /// The raw color-type value
        value: u8,
    },
    /// A catalog feature has no binary encoding
    #[error("feature cannot be represented in binary form: {reason}")]
    UnrepresentableFeature {
        /// Why no color-type variant fits
        reason: String,
    },
    /// An XPM block would need more palette characters than exist
    #[error("bitmap cannot be represented as XPM: {colors} palette colors")]
    UnrepresentableBitmap {
        /// Size of the offending palette
        colors: usize,
    },
    /// Malformed text-form input that cannot be tolerated
    #[error("text syntax error on line {line}: {reason}")]
    TextSyntax {
        /// One-based source line number
        line: usize,
        /// What could not be parsed
        reason: String,
    },
    /// Error returned when the output sink fails
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}
