use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use recap_core::{CompletionRequest, CompletionService, ContentTag};

use super::{complete_blob, Processor, ProcessorBatch, ProcessorOptions};
use crate::classify::status_id;
use crate::error::ProcessorError;

const SYSTEM: &str = "You help summarize a group chat. The messages below shared posts from \
Twitter/X. For each post, say in one short sentence what it appears to be about, using the \
link, its status id and the message around it. Do not invent post contents you cannot infer. \
Reply with a plain bulleted list.";

/// Digest of shared microblogging links.
pub struct SpecialLinkProcessor {
    service: Arc<dyn CompletionService>,
    options: ProcessorOptions,
}

impl SpecialLinkProcessor {
    pub fn new(service: Arc<dyn CompletionService>, options: ProcessorOptions) -> Self {
        Self { service, options }
    }

    pub fn render(batch: &ProcessorBatch, options: &ProcessorOptions) -> CompletionRequest {
        let mut prompt = String::from("Shared posts:\n");
        for url in &batch.urls {
            let status = status_id(url).unwrap_or("unknown");
            match batch.shared_by(url) {
                Some(record) => {
                    let _ = writeln!(
                        prompt,
                        "- {url} (status {status}) shared by {}: {}",
                        record.sender,
                        record.body().trim()
                    );
                }
                None => {
                    let _ = writeln!(prompt, "- {url} (status {status})");
                }
            }
        }
        CompletionRequest::new(SYSTEM, prompt, options.max_tokens).with_model(options.model.clone())
    }
}

#[async_trait]
impl Processor for SpecialLinkProcessor {
    fn tag(&self) -> ContentTag {
        ContentTag::SpecialLink
    }

    async fn process(&self, batch: &ProcessorBatch) -> Result<String, ProcessorError> {
        let request = Self::render(batch, &self.options);
        complete_blob(self.service.as_ref(), request, self.options.max_output_chars).await
    }
}
