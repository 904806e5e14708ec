use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Special-content label attached to a message by the classifier.
///
/// Ordering is the fixed dispatch and prompt order.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTag {
    /// Link to the microblogging platform (canonical or shortened host).
    SpecialLink,
    SportsReference,
    Image,
    /// Any other web link.
    GenericLink,
}

impl ContentTag {
    pub const ALL: [ContentTag; 4] = [
        ContentTag::SpecialLink,
        ContentTag::SportsReference,
        ContentTag::Image,
        ContentTag::GenericLink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpecialLink => "special_link",
            Self::SportsReference => "sports_reference",
            Self::Image => "image",
            Self::GenericLink => "generic_link",
        }
    }

    /// Heading used when the processor output is placed in a prompt.
    pub fn context_heading(self) -> &'static str {
        match self {
            Self::SpecialLink => "Twitter Links Information",
            Self::SportsReference => "Football References Information",
            Self::Image => "Image Content Information",
            Self::GenericLink => "Shared Links Information",
        }
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content tag: {0}")]
pub struct UnknownTag(pub String);

impl FromStr for ContentTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}
