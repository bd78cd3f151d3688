use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use nexus_core::errors::CompletionError;
use nexus_core::provider::{CompletionRequest, CompletionService};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Text(String),
    Error(CompletionError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Completion service that replays scripted responses in order and records
/// every request it receives.
#[derive(Default)]
pub struct MockCompletion {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().push(request.clone());
        let next = self.responses.lock().pop_front();

        let mut current = next.ok_or_else(|| {
            CompletionError::InvalidRequest("MockCompletion: no response configured".into())
        })?;
        loop {
            match current {
                MockResponse::Text(text) => return Ok(text),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ChatTurn;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".into(),
            contents: vec![ChatTurn::user(text)],
            system_instruction: String::new(),
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn sequential_responses() {
        let mock = MockCompletion::new(vec![MockResponse::text("first"), MockResponse::text("second")]);
        assert_eq!(mock.complete(&request("a")).await.unwrap(), "first");
        assert_eq!(mock.complete(&request("b")).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.requests()[1].contents[0].content, "b");
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockCompletion::new(vec![MockResponse::text("only one")]);
        let _ = mock.complete(&request("a")).await;
        assert!(mock.complete(&request("b")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_error() {
        let mock = MockCompletion::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::Error(CompletionError::RateLimited { retry_after: None }),
        )]);
        let start = tokio::time::Instant::now();
        let result = mock.complete(&request("a")).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(matches!(result, Err(CompletionError::RateLimited { .. })));
    }
}
