use recap_core::errors::CompletionError;
use recap_core::tone::UnknownTone;

/// Boundary and contract errors surfaced to the caller.
///
/// Processor and generation failures never show up here; the pipeline
/// downgrades or converts them into user-facing text instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("count must be a positive number of messages, got {0}")]
    InvalidCount(i64),

    #[error("buffer capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error(transparent)]
    InvalidTone(#[from] UnknownTone),
}

/// Why a single processor contributed no blob.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("malformed output: {0}")]
    Malformed(String),

    #[error("processor task failed: {0}")]
    Crashed(String),
}

impl ProcessorError {
    /// Short classification string for logs and unavailable markers.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Completion(e) => e.error_kind(),
            Self::Malformed(_) => "malformed_output",
            Self::Crashed(_) => "crashed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_count_message_is_actionable() {
        let msg = EngineError::InvalidCount(-3).to_string();
        assert_eq!(msg, "count must be a positive number of messages, got -3");
    }

    #[test]
    fn invalid_tone_lists_choices() {
        let err: EngineError = "loud".parse::<recap_core::Tone>().unwrap_err().into();
        let msg = err.to_string();
        assert!(msg.contains("loud"));
        assert!(msg.contains("stoic, chaotic, pubbie, deaf"));
    }

    #[test]
    fn processor_error_kinds() {
        assert_eq!(
            ProcessorError::Completion(CompletionError::Timeout(std::time::Duration::ZERO)).error_kind(),
            "timeout"
        );
        assert_eq!(ProcessorError::Malformed("empty".into()).error_kind(), "malformed_output");
    }
}
