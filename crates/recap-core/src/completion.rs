use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CompletionError;

/// A single prompt sent to the completion service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionRequest {
    /// Instruction block (system prompt).
    pub system: String,
    /// User-turn content: the serialized context.
    pub prompt: String,
    /// Image URLs attached to the user turn.
    pub images: Vec<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Model override; `None` uses the backend's default model.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Refusal,
    Other,
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "refusal" => Self::Refusal,
            _ => Self::Other,
        }
    }
}

/// Text returned by the completion service.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub stop_reason: StopReason,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// Reject outputs that cannot be used as a summary or context blob.
    pub fn validate(self) -> Result<Self, CompletionError> {
        if self.stop_reason == StopReason::Refusal {
            return Err(CompletionError::Guardrail("completion was refused".into()));
        }
        if self.text.trim().is_empty() {
            return Err(CompletionError::Guardrail("completion was empty".into()));
        }
        Ok(self)
    }
}

/// Black-box text generation backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError>;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        (**self).complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_defaults() {
        let req = CompletionRequest::new("sys", "body", 300);
        assert_eq!(req.max_tokens, 300);
        assert!(req.images.is_empty());
        assert!(req.model.is_none());
        assert!(req.temperature.is_none());
    }

    #[test]
    fn validate_rejects_empty_and_refusals() {
        assert!(matches!(
            Completion::text("   \n").validate(),
            Err(CompletionError::Guardrail(_))
        ));
        let refused = Completion {
            text: "no".into(),
            stop_reason: StopReason::Refusal,
        };
        assert!(matches!(refused.validate(), Err(CompletionError::Guardrail(_))));
        assert!(Completion::text("fine").validate().is_ok());
    }

    #[test]
    fn stop_reason_parse() {
        assert_eq!(StopReason::parse("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::parse("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::parse("refusal"), StopReason::Refusal);
        assert_eq!(StopReason::parse("pause_turn"), StopReason::Other);
    }

    struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
            Ok(Completion::text(request.prompt.clone()))
        }
    }

    #[tokio::test]
    async fn arc_dyn_delegates() {
        let svc: Arc<dyn CompletionService> = Arc::new(Echo);
        assert_eq!(svc.name(), "echo");
        let out = svc
            .complete(&CompletionRequest::new("", "hello", 10))
            .await
            .unwrap();
        assert_eq!(out.text, "hello");
    }
}
