use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use recap_core::completion::{Completion, CompletionRequest, CompletionService};
use recap_core::errors::CompletionError;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return a completion.
    Completion(Completion),
    /// Return an error from the complete() call.
    Error(CompletionError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: a plain text completion.
    pub fn text(text: &str) -> Self {
        Self::Completion(Completion::text(text))
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> MockResponse + Send + Sync>;

enum Script {
    Sequence(Vec<MockResponse>),
    Responder(Responder),
}

/// Mock completion service.
///
/// Either replays a fixed sequence of responses or answers each request
/// through a closure, which keeps concurrent callers deterministic.
pub struct MockCompletion {
    script: Script,
    call_count: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self::with_script(Script::Sequence(responses))
    }

    /// Answer every request through `f`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockResponse + Send + Sync + 'static,
    {
        Self::with_script(Script::Responder(Box::new(f)))
    }

    /// Answer every request with the same text.
    pub fn repeating(text: &str) -> Self {
        let text = text.to_string();
        Self::from_fn(move |_| MockResponse::text(&text))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let mut response = match &self.script {
            Script::Sequence(responses) => responses.get(idx).cloned().ok_or_else(|| {
                CompletionError::InvalidRequest(format!(
                    "MockCompletion: no response configured for call {idx}"
                ))
            })?,
            Script::Responder(f) => f(request),
        };

        loop {
            match response {
                MockResponse::Completion(c) => return c.validate(),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_sequence() {
        let mock = MockCompletion::new(vec![MockResponse::text("one"), MockResponse::text("two")]);
        let req = CompletionRequest::new("", "p", 10);
        assert_eq!(mock.complete(&req).await.unwrap().text, "one");
        assert_eq!(mock.complete(&req).await.unwrap().text, "two");
        assert!(mock.complete(&req).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn returns_configured_error() {
        let mock = MockCompletion::new(vec![MockResponse::Error(CompletionError::Overloaded)]);
        let err = mock
            .complete(&CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Overloaded));
    }

    #[tokio::test]
    async fn empty_text_fails_validation() {
        let mock = MockCompletion::repeating("  ");
        let err = mock
            .complete(&CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Guardrail(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_waits() {
        let mock = MockCompletion::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("late"),
        )]);
        let start = tokio::time::Instant::now();
        let out = mock.complete(&CompletionRequest::default()).await.unwrap();
        assert_eq!(out.text, "late");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn responder_sees_request_and_records_it() {
        let mock = MockCompletion::from_fn(|req| MockResponse::text(&req.prompt.to_uppercase()));
        let out = mock
            .complete(&CompletionRequest::new("sys", "shout", 10))
            .await
            .unwrap();
        assert_eq!(out.text, "SHOUT");
        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system, "sys");
    }
}
