//! Per-tag handlers that turn a batch of tagged messages into a context blob.

mod image;
mod links;
mod social;
mod sports;

pub use image::ImageProcessor;
pub use links::GenericLinkProcessor;
pub use social::SpecialLinkProcessor;
pub use sports::SportsProcessor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use recap_core::{CompletionRequest, CompletionService, ContentTag, ConversationId, MessageRecord};
use recap_llm::{ReliableCompletion, ReliableConfig};
use recap_settings::RecapSettings;

use crate::error::ProcessorError;

/// Messages carrying one tag, in buffer order, plus the URLs matched for it.
#[derive(Clone, Debug)]
pub struct ProcessorBatch {
    pub conversation_id: ConversationId,
    pub tag: ContentTag,
    pub records: Vec<MessageRecord>,
    pub urls: Vec<String>,
}

impl ProcessorBatch {
    /// First message in the batch whose text contains `url`.
    pub fn shared_by(&self, url: &str) -> Option<&MessageRecord> {
        self.records.iter().find(|r| r.body().contains(url))
    }
}

/// Uniform capability every specialized processor implements.
#[async_trait]
pub trait Processor: Send + Sync {
    fn tag(&self) -> ContentTag;

    async fn process(&self, batch: &ProcessorBatch) -> Result<String, ProcessorError>;
}

/// Request shaping shared by the completion-backed processors.
#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    pub model: Option<String>,
    pub max_tokens: u32,
    pub max_output_chars: usize,
}

impl ProcessorOptions {
    pub fn from_settings(settings: &RecapSettings, tag: ContentTag) -> Self {
        let processor = settings.processors.get(tag);
        Self {
            model: processor.model.clone(),
            max_tokens: processor.max_tokens,
            max_output_chars: settings.dispatch.max_output_chars,
        }
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 400,
            max_output_chars: 4000,
        }
    }
}

/// Send a rendered request and clean up the blob.
pub(crate) async fn complete_blob(
    service: &dyn CompletionService,
    request: CompletionRequest,
    max_output_chars: usize,
) -> Result<String, ProcessorError> {
    let completion = service.complete(&request).await?;
    let text = completion.text.trim();
    if text.is_empty() {
        return Err(ProcessorError::Malformed("processor returned no text".into()));
    }
    Ok(truncate_output(text, max_output_chars))
}

/// Truncate to `max_chars` characters, appending a size marker.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }
    let end = output
        .char_indices()
        .nth(max_chars)
        .map_or(output.len(), |(i, _)| i);
    format!(
        "{}\n\n[truncated: {total} chars -> {max_chars} chars]",
        &output[..end]
    )
}

/// Processors keyed by the tag they handle.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ContentTag, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for its tag.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.tag(), processor);
    }

    pub fn get(&self, tag: ContentTag) -> Option<Arc<dyn Processor>> {
        self.processors.get(&tag).map(Arc::clone)
    }

    pub fn contains(&self, tag: ContentTag) -> bool {
        self.processors.contains_key(&tag)
    }

    /// Registered tags in dispatch order.
    pub fn tags(&self) -> Vec<ContentTag> {
        let mut tags: Vec<ContentTag> = self.processors.keys().copied().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

/// Retry policy for processor calls. The dispatch deadline bounds them, so
/// there is no per-attempt timeout. The wrapper is shared by every
/// conversation, so it carries no circuit breaker.
pub fn processor_retry_config(settings: &RecapSettings) -> ReliableConfig {
    ReliableConfig {
        max_attempts: settings.retry.max_attempts,
        base_delay: settings.retry.base_delay(),
        max_delay: settings.retry.max_delay(),
        attempt_timeout: None,
        circuit_breaker_threshold: 0,
        ..Default::default()
    }
}

/// One completion-backed processor per tag, each behind its own retry wrapper.
pub fn default_registry(
    service: Arc<dyn CompletionService>,
    settings: &RecapSettings,
) -> ProcessorRegistry {
    let wrap = |tag: ContentTag| -> (Arc<dyn CompletionService>, ProcessorOptions) {
        let reliable = ReliableCompletion::new(Arc::clone(&service), processor_retry_config(settings));
        (Arc::new(reliable), ProcessorOptions::from_settings(settings, tag))
    };

    let mut registry = ProcessorRegistry::new();
    let (svc, opts) = wrap(ContentTag::SpecialLink);
    registry.register(Arc::new(SpecialLinkProcessor::new(svc, opts)));
    let (svc, opts) = wrap(ContentTag::SportsReference);
    registry.register(Arc::new(SportsProcessor::new(svc, opts)));
    let (svc, opts) = wrap(ContentTag::Image);
    registry.register(Arc::new(ImageProcessor::new(svc, opts)));
    let (svc, opts) = wrap(ContentTag::GenericLink);
    registry.register(Arc::new(GenericLinkProcessor::new(svc, opts)));
    registry
}
