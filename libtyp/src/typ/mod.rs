//! The format-agnostic feature catalog: header metadata, point, line and
//! polygon style definitions, bitmaps and the bit-level codecs they share.

#![allow(clippy::module_name_repetitions)]

pub(crate) mod bitmap;
pub(crate) mod feature;
pub(crate) mod header;
pub mod typecode;

use std::fmt::Display;

pub use bitmap::{bpp_for_palette, pack, packed_len, unpack, Bitmap, Color, ColorMode};
pub use feature::{lang, FontStyle, Labels, Line, LineStyle, Point, Polygon};
pub use header::Header;

/// The feature catalog of a TYP file, independent of either serialized form.
///
/// Produced by one reader, freely mutable in between, consumed by one
/// writer. Feature order is preserved through every conversion.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct TypFile {
    /// File metadata
    pub header: Header,
    /// Point-of-interest types, in file order
    pub points: Vec<Point>,
    /// Line types, in file order
    pub lines: Vec<Line>,
    /// Polygon types, in file order
    pub polygons: Vec<Polygon>,
    /// Type codes from the draw-order array, informational only
    pub draw_order: Vec<u32>,
}

impl TypFile {
    /// Creates an empty catalog with a default header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The four sections of a binary TYP file.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SectionKind {
    /// Point-of-interest types
    Points,
    /// Line types
    Lines,
    /// Polygon types
    Polygons,
    /// Draw-order array
    DrawOrder,
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Points => write!(f, "point"),
            Self::Lines => write!(f, "line"),
            Self::Polygons => write!(f, "polygon"),
            Self::DrawOrder => write!(f, "draw order"),
        }
    }
}
