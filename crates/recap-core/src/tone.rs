use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output style applied during final generation.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Stoic,
    Chaotic,
    Pubbie,
    Deaf,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Stoic, Tone::Chaotic, Tone::Pubbie, Tone::Deaf];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stoic => "stoic",
            Self::Chaotic => "chaotic",
            Self::Pubbie => "pubbie",
            Self::Deaf => "deaf",
        }
    }

    /// Comma-separated list of valid names, for user-facing rejections.
    pub fn available() -> String {
        Self::ALL.map(Tone::as_str).join(", ")
    }
}

impl Default for Tone {
    fn default() -> Self {
        Self::Stoic
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tone '{0}'. Available tones: {available}", available = Tone::available())]
pub struct UnknownTone(pub String);

impl FromStr for Tone {
    type Err = UnknownTone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| UnknownTone(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Chaotic".parse::<Tone>().unwrap(), Tone::Chaotic);
        assert_eq!(" deaf ".parse::<Tone>().unwrap(), Tone::Deaf);
    }

    #[test]
    fn rejection_lists_valid_values() {
        let err = "funny".parse::<Tone>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("funny"));
        for tone in Tone::ALL {
            assert!(msg.contains(tone.as_str()), "missing {tone} in {msg}");
        }
    }

    #[test]
    fn available_matches_all() {
        assert_eq!(Tone::available(), "stoic, chaotic, pubbie, deaf");
    }

    #[test]
    fn default_is_stoic() {
        assert_eq!(Tone::default(), Tone::Stoic);
    }
}
