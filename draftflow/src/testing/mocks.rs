//! Scripted generation providers for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::GenerationError;
use crate::llm::{GenerationProvider, GenerationRequest, ProviderResponse};

type Handler =
    Box<dyn Fn(&GenerationRequest, usize) -> Result<ProviderResponse, GenerationError> + Send + Sync>;

/// A provider driven by a closure that sees the request and the zero-based
/// call index. Records every request it receives.
pub struct ScriptedProvider {
    handler: Handler,
    latency: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("latency", &self.latency)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl ScriptedProvider {
    /// Creates a provider from a handler.
    #[must_use]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&GenerationRequest, usize) -> Result<ProviderResponse, GenerationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    #[must_use]
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _| Ok(ProviderResponse::text(text.clone()).with_usage(100, 50)))
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: GenerationError) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    /// Plays `responses` in order, repeating the last one.
    #[must_use]
    pub fn sequence(responses: Vec<Result<ProviderResponse, GenerationError>>) -> Self {
        Self::new(move |_, idx| {
            responses
                .get(idx)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_else(|| Err(GenerationError::InvalidResponse("empty script".into())))
        })
    }

    /// Sleeps this long before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `generate` calls started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.requests.lock().clear();
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResponse, GenerationError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(request, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "s".into(),
            user: "u".into(),
            model: "m".into(),
            temperature: None,
            max_tokens: None,
            json_mode: false,
            schema: None,
        }
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let provider = ScriptedProvider::sequence(vec![
            Err(GenerationError::Timeout("t".into())),
            Ok(ProviderResponse::text("done")),
        ]);

        assert!(provider.generate(&request()).await.is_err());
        assert_eq!(provider.generate(&request()).await.unwrap().text, "done");
        assert_eq!(provider.generate(&request()).await.unwrap().text, "done");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_reset() {
        let provider = ScriptedProvider::always("x");
        provider.generate(&request()).await.unwrap();
        provider.reset();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.requests().is_empty());
    }
}
