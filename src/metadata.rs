//! Format constants and canonical paths

use std::fmt;

/// Root attribute holding the format version
pub const FORMAT_VERSION_ATTR: &str = "file_format";

pub const RAW_PATH: &str = "/volumes/raw";
pub const NEURON_IDS_PATH: &str = "/volumes/labels/neuron_ids";
pub const NEURON_IDS_CONFIDENCE_PATH: &str = "/volumes/labels/neuron_ids_confidence";
pub const CLEFTS_PATH: &str = "/volumes/labels/clefts";
pub const ANNOTATIONS_PATH: &str = "/annotations";
pub const ANNOTATION_IDS_PATH: &str = "/annotations/ids";
pub const ANNOTATION_TYPES_PATH: &str = "/annotations/types";
pub const ANNOTATION_LOCATIONS_PATH: &str = "/annotations/locations";
pub const ANNOTATION_COMMENTS_PATH: &str = "/annotations/comments";
pub const COMMENT_TARGET_IDS_PATH: &str = "/annotations/comments/target_ids";
pub const COMMENT_TEXTS_PATH: &str = "/annotations/comments/comments";
pub const PARTNERS_PATH: &str = "/annotations/presynaptic_site/partners";

/// CREMI file format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 0, minor: 2 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse a `major.minor` string
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.split_once('.')?;
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
