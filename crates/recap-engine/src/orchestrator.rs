use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

use recap_core::{
    CompletionError, CompletionRequest, CompletionService, ContentTag, ConversationId, MessageId,
    MessageRecord, RequestId, Tone,
};
use recap_llm::{ReliableCompletion, ReliableConfig};
use recap_settings::{RecapSettings, RetrySettings};

use crate::classify::{classify, ClassificationResult};
use crate::error::ProcessorError;
use crate::processors::{ProcessorBatch, ProcessorRegistry};
use crate::tone::{system_prompt, DEAF_SILENCE};
use crate::transcript::format_transcript;

/// Per-request pipeline state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Classifying,
    Dispatching,
    Aggregating,
    Generating,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classifying => "classifying",
            Self::Dispatching => "dispatching",
            Self::Aggregating => "aggregating",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one processor contributed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorOutput {
    Completed(String),
    /// The processor failed or missed the deadline; carries a short reason.
    Unavailable(String),
}

/// Everything the final generation step sees.
#[derive(Clone, Debug)]
pub struct CompositionContext {
    pub conversation_text: String,
    pub processor_outputs: BTreeMap<ContentTag, ProcessorOutput>,
    pub tone: Tone,
    pub message_mapping: BTreeMap<MessageId, MessageRecord>,
}

impl CompositionContext {
    /// Instruction-and-context prompt. Processor sections follow tag order.
    pub fn render_prompt(&self) -> String {
        let mut prompt = format!(
            "Summarize the following messages in a {} tone.\n\nMessages:\n{}",
            self.tone, self.conversation_text
        );
        for (tag, output) in &self.processor_outputs {
            let body = match output {
                ProcessorOutput::Completed(blob) => blob.clone(),
                ProcessorOutput::Unavailable(reason) => format!("unavailable ({reason})"),
            };
            prompt.push_str(&format!("\n\n{}:\n{body}", tag.context_heading()));
        }
        prompt
    }

    /// Source messages in buffer order.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.message_mapping.values().cloned().collect()
    }
}

/// Terminal result of one pipeline run.
#[derive(Clone, Debug)]
pub enum PipelineOutcome {
    /// `context` is absent for fixed replies that never reached generation.
    Done {
        summary: String,
        context: Option<CompositionContext>,
    },
    Failed { message: String },
}

/// Generation retry policy from settings. Bounded retries only: one
/// conversation's failures must not trip a breaker for the others.
pub fn generation_retry_config(retry: &RetrySettings) -> ReliableConfig {
    ReliableConfig {
        max_attempts: retry.max_attempts,
        base_delay: retry.base_delay(),
        max_delay: retry.max_delay(),
        attempt_timeout: Some(retry.attempt_timeout()),
        circuit_breaker_threshold: 0,
        ..Default::default()
    }
}

/// User-facing replacement text for a failed generation.
pub fn failure_message(error: &CompletionError) -> String {
    match error {
        CompletionError::Guardrail(_) | CompletionError::MalformedResponse(_) => {
            "Sorry, I couldn't produce a proper summary of those messages. Try a different number of messages or another tone."
        }
        CompletionError::Overloaded => {
            "The summarization service is unavailable right now. Please try again in a minute."
        }
        CompletionError::AuthenticationFailed(_) => {
            "Summarization is not configured correctly. Please contact the bot administrator."
        }
        CompletionError::Timeout(_)
        | CompletionError::RateLimited { .. }
        | CompletionError::ServerError { .. }
        | CompletionError::NetworkError(_) => {
            "Sorry, the summarization service didn't respond in time. Please try again later."
        }
        CompletionError::InvalidRequest(_) | CompletionError::Cancelled => {
            "Sorry, something went wrong while generating the summary."
        }
    }
    .to_string()
}

/// Classify, fan out to processors, merge, generate.
pub struct Orchestrator {
    generator: ReliableCompletion<Arc<dyn CompletionService>>,
    registry: Arc<ProcessorRegistry>,
    settings: Arc<RecapSettings>,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn CompletionService>,
        registry: Arc<ProcessorRegistry>,
        settings: Arc<RecapSettings>,
    ) -> Self {
        let generator = ReliableCompletion::new(service, generation_retry_config(&settings.retry));
        Self {
            generator,
            registry,
            settings,
        }
    }

    fn enter(&self, stage: Stage) {
        Span::current().record("stage", stage.as_str());
        debug!(stage = %stage, "stage transition");
    }

    /// Run the pipeline over a point-in-time window. Never panics or errors;
    /// failures come back as `PipelineOutcome::Failed` with user-facing text.
    #[instrument(
        name = "summarize",
        skip(self, records),
        fields(
            conversation_id = %conversation_id,
            request_id = %request_id,
            tone = %tone,
            messages = records.len(),
            stage = tracing::field::Empty,
        )
    )]
    pub async fn run(
        &self,
        conversation_id: &ConversationId,
        request_id: &RequestId,
        records: Vec<MessageRecord>,
        tone: Tone,
    ) -> PipelineOutcome {
        self.enter(Stage::Classifying);
        let transcript = format_transcript(&records, tone);
        if transcript.is_empty() && tone == Tone::Deaf {
            self.enter(Stage::Done);
            info!("nothing shouted in window");
            return PipelineOutcome::Done {
                summary: DEAF_SILENCE.to_string(),
                context: None,
            };
        }
        let classification = classify(&records);

        self.enter(Stage::Dispatching);
        let processor_outputs = self
            .dispatch(conversation_id, &records, &classification, tone)
            .await;

        self.enter(Stage::Aggregating);
        let context = CompositionContext {
            conversation_text: transcript.join("\n"),
            processor_outputs,
            tone,
            message_mapping: records.into_iter().map(|r| (r.id, r)).collect(),
        };

        self.enter(Stage::Generating);
        let request = CompletionRequest::new(
            system_prompt(tone),
            context.render_prompt(),
            self.settings.generation.token_budget(context.message_mapping.len()),
        )
        .with_model(Some(self.settings.generation.model.clone()));

        match self.generator.complete(&request).await {
            Ok(completion) => {
                self.enter(Stage::Done);
                PipelineOutcome::Done {
                    summary: completion.text.trim().to_string(),
                    context: Some(context),
                }
            }
            Err(e) => {
                self.enter(Stage::Failed);
                error!(error = %e, error_kind = e.error_kind(), "summary generation failed");
                PipelineOutcome::Failed {
                    message: failure_message(&e),
                }
            }
        }
    }

    /// Tags that will actually be dispatched for `tone`.
    fn should_dispatch(&self, tag: ContentTag, tone: Tone) -> bool {
        if !self.settings.processors.get(tag).enabled {
            debug!(tag = %tag, "processor disabled");
            return false;
        }
        if self.settings.skips(tone, tag) {
            debug!(tag = %tag, tone = %tone, "processor skipped for tone");
            return false;
        }
        if !self.registry.contains(tag) {
            debug!(tag = %tag, "no processor registered");
            return false;
        }
        true
    }

    async fn dispatch(
        &self,
        conversation_id: &ConversationId,
        records: &[MessageRecord],
        classification: &ClassificationResult,
        tone: Tone,
    ) -> BTreeMap<ContentTag, ProcessorOutput> {
        let deadline = Instant::now() + self.settings.dispatch.deadline();
        let by_id: HashMap<MessageId, &MessageRecord> = records.iter().map(|r| (r.id, r)).collect();

        let mut handles = Vec::new();
        for tag in classification.tags() {
            if !self.should_dispatch(tag, tone) {
                continue;
            }
            let (Some(processor), Some(hits)) = (self.registry.get(tag), classification.get(tag)) else {
                continue;
            };
            let batch = ProcessorBatch {
                conversation_id: conversation_id.clone(),
                tag,
                records: hits
                    .message_ids
                    .iter()
                    .filter_map(|id| by_id.get(id).map(|r| (*r).clone()))
                    .collect(),
                urls: hits.urls.clone(),
            };
            debug!(tag = %tag, messages = batch.records.len(), "dispatching processor");
            let span = tracing::info_span!("processor", tag = %tag);
            handles.push((
                tag,
                tokio::spawn(async move { processor.process(&batch).await }.instrument(span)),
            ));
        }

        // A handle dropped at the deadline detaches its task; whatever it
        // produces later is discarded.
        let joined = join_all(handles.into_iter().map(|(tag, handle)| async move {
            (tag, tokio::time::timeout_at(deadline, handle).await)
        }))
        .await;

        let mut outputs = BTreeMap::new();
        for (tag, result) in joined {
            let output = match result {
                Ok(Ok(Ok(blob))) => ProcessorOutput::Completed(blob),
                Ok(Ok(Err(e))) => {
                    warn!(tag = %tag, error = %e, error_kind = e.error_kind(), "processor failed");
                    ProcessorOutput::Unavailable(e.error_kind().to_string())
                }
                Ok(Err(join_err)) => {
                    let e = ProcessorError::Crashed(join_err.to_string());
                    warn!(tag = %tag, error = %e, error_kind = e.error_kind(), "processor task failed");
                    ProcessorOutput::Unavailable(e.error_kind().to_string())
                }
                Err(_) => {
                    warn!(
                        tag = %tag,
                        deadline_ms = self.settings.dispatch.deadline_ms,
                        "processor missed dispatch deadline"
                    );
                    ProcessorOutput::Unavailable("timed out".to_string())
                }
            };
            outputs.insert(tag, output);
        }
        outputs
    }
}
