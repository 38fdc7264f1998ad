use bon::Builder;

use crate::codepage::Codepage;

/// TYP file metadata: the four values binding a style file to a map family
/// and fixing the string encoding of its binary form.
#[derive(Builder, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub struct Header {
    /// Format version, 1 in every file seen in the wild
    #[builder(default = 1)]
    pub version: u16,

    /// Character encoding of label strings in the binary form
    /// (1250, 1252, 65001, ...)
    #[builder(default = 1252)]
    pub codepage: u16,

    /// Family ID the style binds to
    #[builder(default)]
    pub fid: u16,

    /// Product ID the style binds to
    #[builder(default)]
    pub pid: u16,
}

impl Default for Header {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Header {
    /// The transcoder for this header's codepage.
    #[must_use]
    pub fn encoding(&self) -> Codepage {
        Codepage::from_id(self.codepage)
    }
}
