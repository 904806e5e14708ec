use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use recap_core::{CompletionRequest, CompletionService, ContentTag};

use super::{complete_blob, Processor, ProcessorBatch, ProcessorOptions};
use crate::classify::{sports_signals, SportsSignals};
use crate::error::ProcessorError;

const SYSTEM: &str = "You are a football analyst helping summarize a group chat. From the \
detected signals and messages below, give short match context: which teams and competitions \
came up, scores and key moments, and how the chat reacted. Keep it under 120 words.";

fn describe(signals: &SportsSignals) -> String {
    let mut parts = Vec::new();
    if !signals.scores.is_empty() {
        parts.push(format!("scores {}", signals.scores.join(", ")));
    }
    if !signals.teams.is_empty() {
        parts.push(format!("teams {}", signals.teams.join(", ")));
    }
    if !signals.competitions.is_empty() {
        parts.push(format!("competitions {}", signals.competitions.join(", ")));
    }
    if !signals.commentary.is_empty() {
        let kinds: Vec<&str> = signals.commentary.iter().map(|c| c.as_str()).collect();
        parts.push(format!("commentary {}", kinds.join(", ")));
    }
    if !signals.minutes.is_empty() {
        parts.push(format!("minutes {}", signals.minutes.join(", ")));
    }
    if signals.excited() {
        parts.push("excited".to_string());
    }
    parts.join("; ")
}

/// Match context from football chatter.
pub struct SportsProcessor {
    service: Arc<dyn CompletionService>,
    options: ProcessorOptions,
}

impl SportsProcessor {
    pub fn new(service: Arc<dyn CompletionService>, options: ProcessorOptions) -> Self {
        Self { service, options }
    }

    pub fn render(batch: &ProcessorBatch, options: &ProcessorOptions) -> CompletionRequest {
        let mut prompt = String::from("Football messages:\n");
        for record in &batch.records {
            let signals = sports_signals(record.body());
            let _ = writeln!(
                prompt,
                "- {}: {}\n  signals: {}",
                record.sender,
                record.body().trim(),
                describe(&signals)
            );
        }
        CompletionRequest::new(SYSTEM, prompt, options.max_tokens).with_model(options.model.clone())
    }
}

#[async_trait]
impl Processor for SportsProcessor {
    fn tag(&self) -> ContentTag {
        ContentTag::SportsReference
    }

    async fn process(&self, batch: &ProcessorBatch) -> Result<String, ProcessorError> {
        let request = Self::render(batch, &self.options);
        complete_blob(self.service.as_ref(), request, self.options.max_output_chars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::tests::batch;
    use recap_core::MessageRecord;

    #[test]
    fn signals_are_listed_per_message() {
        let b = batch(
            ContentTag::SportsReference,
            vec![
                MessageRecord::text(1, "alice", "LIVERPOOL 2-1 CHELSEA, WHAT A GOAL!!"),
                MessageRecord::text(2, "bob", "spurs in the 90+3' again"),
            ],
            &[],
        );
        let req = SportsProcessor::render(&b, &ProcessorOptions::default());
        let lines: Vec<&str> = req.prompt.lines().collect();
        assert_eq!(lines[1], "- alice: LIVERPOOL 2-1 CHELSEA, WHAT A GOAL!!");
        assert!(lines[2].contains("scores 2-1"));
        assert!(lines[2].contains("Liverpool"));
        assert!(lines[2].contains("excited"));
        assert!(lines[4].contains("minutes 90+3'"));
        assert!(!lines[4].contains("excited"));
    }

    #[test]
    fn model_is_forwarded() {
        let options = ProcessorOptions {
            model: Some("claude-haiku-4-5".into()),
            ..Default::default()
        };
        let b = batch(ContentTag::SportsReference, vec![MessageRecord::text(1, "a", "1-0")], &[]);
        let req = SportsProcessor::render(&b, &options);
        assert_eq!(req.model.as_deref(), Some("claude-haiku-4-5"));
    }
}
