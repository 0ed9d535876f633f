//! Container names and attribute keys of the recorded file layout.
//!
//! ```text
//! /                         version
//! /sources/<uuid>           Source
//!     properties/  sources/  epochGroups/ (index links)  notes
//! /experiments/<uuid>       Experiment
//!     properties/  epochGroups/<uuid>  notes
//! .../epochGroups/<uuid>    EpochGroup
//!     properties/  epochGroups/  source (link)  notes
//! ```

/// Container format version written to the root on creation.
pub const FILE_FORMAT_VERSION: i64 = 1;

pub(crate) const SOURCES: &str = "sources";
pub(crate) const EXPERIMENTS: &str = "experiments";
pub(crate) const EPOCH_GROUPS: &str = "epochGroups";
pub(crate) const PROPERTIES: &str = "properties";
pub(crate) const NOTES: &str = "notes";
pub(crate) const SOURCE_LINK: &str = "source";

pub(crate) const ATTR_VERSION: &str = "version";
pub(crate) const ATTR_KIND: &str = "kind";
pub(crate) const ATTR_UUID: &str = "uuid";
pub(crate) const ATTR_LABEL: &str = "label";
pub(crate) const ATTR_PURPOSE: &str = "purpose";
pub(crate) const ATTR_KEYWORDS: &str = "keywords";

pub(crate) const ATTR_QUANTITY: &str = "quantity";
pub(crate) const ATTR_EXPONENT: &str = "exponent";
pub(crate) const ATTR_BASE_UNIT: &str = "baseUnit";

pub(crate) const KEYWORD_DELIMITER: char = ',';

/// Which timeline bound an attribute pair describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeBound {
    Start,
    End,
}

impl TimeBound {
    pub(crate) fn ticks_attr(self) -> &'static str {
        match self {
            Self::Start => "startTimeUtcTicks",
            Self::End => "endTimeUtcTicks",
        }
    }

    pub(crate) fn offset_attr(self) -> &'static str {
        match self {
            Self::Start => "startTimeUtcOffsetHours",
            Self::End => "endTimeUtcOffsetHours",
        }
    }
}
