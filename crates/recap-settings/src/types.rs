//! Settings type definitions.
//!
//! Every struct is `#[serde(rename_all = "camelCase", default)]` so a
//! partial JSON file only needs the keys it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use recap_core::{ContentTag, Tone};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecapSettings {
    pub buffer: BufferSettings,
    pub linking: LinkingSettings,
    pub retry: RetrySettings,
    pub generation: GenerationSettings,
    pub dispatch: DispatchSettings,
    pub processors: ProcessorsSettings,
    /// Processors skipped per tone, keyed by tone name.
    pub tone_skip: BTreeMap<String, Vec<ContentTag>>,
    pub server: ServerSettings,
    pub api: ApiSettings,
    pub logging: LoggingSettings,
}

impl Default for RecapSettings {
    fn default() -> Self {
        let mut tone_skip = BTreeMap::new();
        tone_skip.insert(
            Tone::Deaf.as_str().to_string(),
            vec![ContentTag::Image, ContentTag::SportsReference],
        );
        Self {
            buffer: BufferSettings::default(),
            linking: LinkingSettings::default(),
            retry: RetrySettings::default(),
            generation: GenerationSettings::default(),
            dispatch: DispatchSettings::default(),
            processors: ProcessorsSettings::default(),
            tone_skip,
            server: ServerSettings::default(),
            api: ApiSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RecapSettings {
    /// Whether `tag` is skipped when summarizing in `tone`.
    pub fn skips(&self, tone: Tone, tag: ContentTag) -> bool {
        self.tone_skip
            .get(tone.as_str())
            .is_some_and(|tags| tags.contains(&tag))
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(SettingsError::invalid("buffer.capacity", "must be at least 1"));
        }
        if self.linking.min_phrase_len == 0 || self.linking.min_phrase_len > self.linking.max_phrase_len {
            return Err(SettingsError::invalid(
                "linking.minPhraseLen",
                format!(
                    "{} must be between 1 and linking.maxPhraseLen ({})",
                    self.linking.min_phrase_len, self.linking.max_phrase_len
                ),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::invalid("retry.maxAttempts", "must be at least 1"));
        }
        if self.generation.base_tokens > self.generation.max_tokens {
            return Err(SettingsError::invalid(
                "generation.baseTokens",
                format!(
                    "{} exceeds generation.maxTokens ({})",
                    self.generation.base_tokens, self.generation.max_tokens
                ),
            ));
        }
        for name in self.tone_skip.keys() {
            if name.parse::<Tone>().is_err() {
                return Err(SettingsError::invalid(
                    "toneSkip",
                    format!("'{name}' is not a tone (expected one of {})", Tone::available()),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferSettings {
    /// Records kept per conversation.
    pub capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkingSettings {
    pub enabled: bool,
    pub max_links: usize,
    pub min_phrase_len: usize,
    pub max_phrase_len: usize,
}

impl Default for LinkingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_links: 8,
            min_phrase_len: 4,
            max_phrase_len: 30,
        }
    }
}

/// Retry policy for the final generation call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub default_tone: Tone,
    pub base_tokens: u32,
    pub tokens_per_message: u32,
    pub max_tokens: u32,
    pub model: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            default_tone: Tone::Stoic,
            base_tokens: 250,
            tokens_per_message: 10,
            max_tokens: 500,
            model: "claude-sonnet-4-5".to_string(),
        }
    }
}

impl GenerationSettings {
    /// `min(base + perMessage * count, max)`.
    pub fn token_budget(&self, message_count: usize) -> u32 {
        let count = u32::try_from(message_count).unwrap_or(u32::MAX);
        self.tokens_per_message
            .saturating_mul(count)
            .saturating_add(self.base_tokens)
            .min(self.max_tokens)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Deadline for the whole fan-out, not per processor.
    pub deadline_ms: u64,
    pub max_output_chars: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            deadline_ms: 30_000,
            max_output_chars: 4000,
        }
    }
}

impl DispatchSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Per-tag processor settings. Keys match the tag names (`special_link`, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ProcessorsSettings {
    pub special_link: ProcessorSettings,
    pub sports_reference: ProcessorSettings,
    pub image: ProcessorSettings,
    pub generic_link: ProcessorSettings,
}

impl Default for ProcessorsSettings {
    fn default() -> Self {
        Self {
            special_link: ProcessorSettings::with_model("claude-haiku-4-5"),
            sports_reference: ProcessorSettings::with_model("claude-haiku-4-5"),
            image: ProcessorSettings::with_model("claude-sonnet-4-5"),
            generic_link: ProcessorSettings::with_model("claude-haiku-4-5"),
        }
    }
}

impl ProcessorsSettings {
    pub fn get(&self, tag: ContentTag) -> &ProcessorSettings {
        match tag {
            ContentTag::SpecialLink => &self.special_link,
            ContentTag::SportsReference => &self.sports_reference,
            ContentTag::Image => &self.image,
            ContentTag::GenericLink => &self.generic_link,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorSettings {
    pub enabled: bool,
    pub model: Option<String>,
    pub max_tokens: u32,
}

impl ProcessorSettings {
    fn with_model(model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            ..Default::default()
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            max_tokens: 400,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9191,
        }
    }
}

/// Completion service endpoint. The API key is read from the environment, never from here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    pub base_url: String,
    pub anthropic_version: String,
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive; RUST_LOG still wins.
    pub level: String,
    pub json: bool,
    /// Persist WARN and ERROR events to `~/.recap/database/logs.db`.
    pub persist_warnings: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            persist_warnings: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = RecapSettings::default();
        assert_eq!(s.buffer.capacity, 100);
        assert!(s.linking.enabled);
        assert_eq!(s.linking.max_links, 8);
        assert_eq!(s.linking.min_phrase_len, 4);
        assert_eq!(s.linking.max_phrase_len, 30);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(s.generation.default_tone, Tone::Stoic);
        assert_eq!(s.dispatch.deadline(), Duration::from_secs(30));
        assert_eq!(s.processors.get(ContentTag::Image).max_tokens, 400);
        assert_eq!(s.server.port, 9191);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case_and_tag_keys() {
        let json = serde_json::to_value(RecapSettings::default()).unwrap();
        assert_eq!(json["linking"]["maxLinks"], 8);
        assert_eq!(json["generation"]["defaultTone"], "stoic");
        assert_eq!(json["processors"]["sports_reference"]["enabled"], true);
        assert_eq!(
            json["toneSkip"]["deaf"],
            serde_json::json!(["image", "sports_reference"])
        );
    }

    #[test]
    fn deaf_skips_image_and_sports_only() {
        let s = RecapSettings::default();
        assert!(s.skips(Tone::Deaf, ContentTag::Image));
        assert!(s.skips(Tone::Deaf, ContentTag::SportsReference));
        assert!(!s.skips(Tone::Deaf, ContentTag::SpecialLink));
        assert!(!s.skips(Tone::Stoic, ContentTag::Image));
    }

    #[test]
    fn token_budget_is_clamped() {
        let g = GenerationSettings::default();
        assert_eq!(g.token_budget(0), 250);
        assert_eq!(g.token_budget(5), 300);
        assert_eq!(g.token_budget(25), 500);
        assert_eq!(g.token_budget(1000), 500);
        assert_eq!(g.token_budget(usize::MAX), 500);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut s = RecapSettings::default();
        s.buffer.capacity = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("buffer.capacity"));
    }

    #[test]
    fn validate_rejects_inverted_phrase_bounds() {
        let mut s = RecapSettings::default();
        s.linking.min_phrase_len = 40;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_tone_skip_key() {
        let mut s = RecapSettings::default();
        s.tone_skip.insert("whisper".into(), vec![ContentTag::Image]);
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("whisper"));
    }
}
