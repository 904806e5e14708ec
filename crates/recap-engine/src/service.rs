use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use recap_core::{CompletionService, ConversationId, MessageRecord, RequestId, Tone};
use recap_settings::RecapSettings;

use crate::buffer::AppendOutcome;
use crate::error::EngineError;
use crate::linking::{attach_links, find_candidates};
use crate::orchestrator::{Orchestrator, PipelineOutcome};
use crate::processors::{default_registry, ProcessorRegistry};
use crate::store::ConversationStore;

pub const NOTHING_TO_SUMMARIZE: &str = "Nothing to summarize yet.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Summarized,
    Empty,
    /// Generation failed; `text` is a user-facing explanation.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryOutcome {
    pub status: SummaryStatus,
    pub text: String,
}

impl SummaryOutcome {
    fn new(status: SummaryStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }
}

/// Inbound surface used by transports: store, set tone, summarize.
pub struct SummaryService {
    store: ConversationStore,
    orchestrator: Orchestrator,
    settings: Arc<RecapSettings>,
}

impl SummaryService {
    /// Service with the default completion-backed processors.
    pub fn new(service: Arc<dyn CompletionService>, settings: RecapSettings) -> Result<Self, EngineError> {
        let registry = default_registry(Arc::clone(&service), &settings);
        Self::with_registry(service, registry, settings)
    }

    pub fn with_registry(
        service: Arc<dyn CompletionService>,
        registry: ProcessorRegistry,
        settings: RecapSettings,
    ) -> Result<Self, EngineError> {
        let store = ConversationStore::new(settings.buffer.capacity)?;
        let settings = Arc::new(settings);
        let orchestrator = Orchestrator::new(service, Arc::new(registry), Arc::clone(&settings));
        Ok(Self {
            store,
            orchestrator,
            settings,
        })
    }

    pub fn settings(&self) -> &RecapSettings {
        &self.settings
    }

    pub fn store_message(
        &self,
        conversation_id: &ConversationId,
        record: MessageRecord,
    ) -> Result<AppendOutcome, EngineError> {
        self.store.append(conversation_id, record)
    }

    /// Persist a tone for the conversation. Unknown names are rejected with
    /// the list of valid ones.
    pub fn set_tone(&self, conversation_id: &ConversationId, tone: &str) -> Result<Tone, EngineError> {
        let tone: Tone = tone.parse()?;
        self.store.set_tone(conversation_id, tone)?;
        info!(conversation_id = %conversation_id, tone = %tone, "tone updated");
        Ok(tone)
    }

    /// The conversation's tone, or the configured default.
    pub fn tone(&self, conversation_id: &ConversationId) -> Tone {
        self.store
            .tone(conversation_id)
            .unwrap_or(self.settings.generation.default_tone)
    }

    fn resolve_tone(&self, conversation_id: &ConversationId, requested: Option<&str>) -> Tone {
        match requested {
            None => self.tone(conversation_id),
            Some(name) => name.parse().unwrap_or_else(|_| {
                let fallback = self.settings.generation.default_tone;
                warn!(
                    conversation_id = %conversation_id,
                    requested = name,
                    fallback = %fallback,
                    "unknown tone requested, using default"
                );
                fallback
            }),
        }
    }

    /// Summarize the most recent `count` messages.
    ///
    /// Only contract violations are errors; pipeline failures come back as
    /// `SummaryStatus::Failed` with text meant for the user.
    pub async fn summarize(
        &self,
        conversation_id: &ConversationId,
        count: i64,
        tone: Option<&str>,
    ) -> Result<SummaryOutcome, EngineError> {
        if count <= 0 {
            return Err(EngineError::InvalidCount(count));
        }
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let records = self.store.window(conversation_id, count)?;
        if records.is_empty() {
            return Ok(SummaryOutcome::new(SummaryStatus::Empty, NOTHING_TO_SUMMARIZE));
        }

        let tone = self.resolve_tone(conversation_id, tone);
        let request_id = RequestId::new();
        let outcome = self
            .orchestrator
            .run(conversation_id, &request_id, records, tone)
            .await;

        Ok(match outcome {
            PipelineOutcome::Done {
                summary,
                context: Some(context),
            } if self.settings.linking.enabled => {
                let linking = &self.settings.linking;
                let candidates = find_candidates(
                    &context.records(),
                    &summary,
                    linking.min_phrase_len,
                    linking.max_phrase_len,
                );
                let linked = attach_links(&summary, &candidates, conversation_id, linking.max_links);
                info!(
                    conversation_id = %conversation_id,
                    request_id = %request_id,
                    candidates = candidates.len(),
                    "summary produced"
                );
                SummaryOutcome::new(SummaryStatus::Summarized, linked)
            }
            PipelineOutcome::Done { summary, .. } => SummaryOutcome::new(SummaryStatus::Summarized, summary),
            PipelineOutcome::Failed { message } => SummaryOutcome::new(SummaryStatus::Failed, message),
        })
    }
}
