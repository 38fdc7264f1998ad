//! The mkgmap-compatible text form: UTF-8, line-oriented `[section]` blocks
//! of `key=value` pairs with embedded XPM bitmap art.

pub(crate) mod reader;
pub(crate) mod writer;
pub(crate) mod xpm;

pub use reader::Reader;
pub use writer::Writer;
