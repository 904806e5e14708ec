use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use recap_core::{CompletionRequest, CompletionService, ContentTag};

use super::{complete_blob, Processor, ProcessorBatch, ProcessorOptions};
use crate::error::ProcessorError;

const SYSTEM: &str = "You help summarize a group chat. For each shared web link below, write a \
one-line note on what it probably points to, judging from the address and the message that \
shared it. Reply with a plain bulleted list.";

/// One-line notes on shared web links.
pub struct GenericLinkProcessor {
    service: Arc<dyn CompletionService>,
    options: ProcessorOptions,
}

impl GenericLinkProcessor {
    pub fn new(service: Arc<dyn CompletionService>, options: ProcessorOptions) -> Self {
        Self { service, options }
    }

    pub fn render(batch: &ProcessorBatch, options: &ProcessorOptions) -> CompletionRequest {
        let mut prompt = String::from("Shared links:\n");
        for url in &batch.urls {
            match batch.shared_by(url) {
                Some(record) => {
                    let _ = writeln!(
                        prompt,
                        "- {url} shared by {}: {}",
                        record.sender,
                        record.body().trim()
                    );
                }
                None => {
                    let _ = writeln!(prompt, "- {url}");
                }
            }
        }
        CompletionRequest::new(SYSTEM, prompt, options.max_tokens).with_model(options.model.clone())
    }
}

#[async_trait]
impl Processor for GenericLinkProcessor {
    fn tag(&self) -> ContentTag {
        ContentTag::GenericLink
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
    fn microblog_links_are_left_out() {
        let b = batch(
            ContentTag::GenericLink,
            vec![MessageRecord::text(
                3,
                "carol",
                "read https://example.com/story, also https://x.com/a/status/1",
            )],
            &["https://example.com/story", "https://example.org/orphan"],
        );
        let req = GenericLinkProcessor::render(&b, &ProcessorOptions::default());
        assert!(req.prompt.contains("- https://example.com/story shared by carol"));
        assert!(req.prompt.contains("- https://example.org/orphan\n"));
        assert!(!req.prompt.contains("- https://x.com"));
    }
}
