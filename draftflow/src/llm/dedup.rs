//! Fingerprinted, deduplicated, retried generation calls.
//!
//! A call is identified by its fingerprint. The first caller to insert the
//! `InProgress` record holds the lock and talks to the provider; concurrent
//! callers with the same fingerprint poll the record and return the cached
//! result once it lands. Failed records and stale in-progress records (left
//! by crashed holders) are reclaimed with a compare-and-update.

use super::fingerprint::call_fingerprint;
use super::limits::check_input_limits;
use super::provider::{GenerationProvider, GenerationRequest, ProviderResponse};
use super::response::{parse_json_response, validate_schema};
use super::retry::{with_retry, RetryPolicy};
use super::cost::estimate_cost;
use crate::config::LlmConfig;
use crate::core::{CallRecord, CallStatus, CallUsage};
use crate::errors::GenerationError;
use crate::store::{CallRepository, InsertOutcome};
use crate::utils::{is_older_than, now_utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime settings of a [`CallDeduplicator`].
#[derive(Debug, Clone, PartialEq)]
pub struct DedupSettings {
    /// Model used when a request does not name one.
    pub model: String,
    /// When false no call records are written and every call hits the provider.
    pub cache_enabled: bool,
    /// Maximum combined prompt characters.
    pub max_chars_total: usize,
    /// Per-attempt provider timeout.
    pub request_timeout: Duration,
    /// Age after which an `InProgress` record is considered abandoned.
    pub lock_timeout: Duration,
    /// Poll interval while waiting on another caller.
    pub poll_interval: Duration,
    /// Retry policy for transient provider errors.
    pub retry: RetryPolicy,
}

impl From<&LlmConfig> for DedupSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            cache_enabled: config.cache_enabled,
            max_chars_total: config.max_chars_total,
            request_timeout: config.timeout(),
            lock_timeout: config.lock_timeout(),
            poll_interval: config.poll_interval(),
            retry: config.retry_policy(),
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl DedupSettings {
    /// Sets the lock timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables caching.
    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets the input limit.
    #[must_use]
    pub fn with_max_chars_total(mut self, limit: usize) -> Self {
        self.max_chars_total = limit;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Sampling parameters of a call. Part of the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    /// Overrides the default model.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
}

impl CallParams {
    /// Empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn fingerprint_params(&self, json_mode: bool) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(t) = self.temperature {
            map.insert("temperature".to_string(), serde_json::json!(t));
        }
        if let Some(m) = self.max_tokens {
            map.insert("max_tokens".to_string(), serde_json::json!(m));
        }
        if json_mode {
            map.insert("response_format".to_string(), Value::String("json".to_string()));
        }
        map
    }
}

/// A deduplicated call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Sampling parameters.
    pub params: CallParams,
    /// Parse the response as JSON.
    pub json_mode: bool,
    /// Schema the JSON response must satisfy.
    pub schema: Option<Value>,
}

impl CallRequest {
    /// A text call.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            params: CallParams::default(),
            json_mode: false,
            schema: None,
        }
    }

    /// Sets sampling parameters.
    #[must_use]
    pub fn with_params(mut self, params: CallParams) -> Self {
        self.params = params;
        self
    }

    /// Switches to JSON mode, optionally validating against `schema`.
    #[must_use]
    pub fn json(mut self, schema: Option<Value>) -> Self {
        self.json_mode = true;
        self.schema = schema;
        self
    }
}

/// Metadata reported with every call result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMeta {
    /// Model used.
    pub model: String,
    /// Provider latency (zero for cached results).
    pub latency_ms: u64,
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u64,
    /// Cost of this call in USD; zero when served from cache.
    pub cost_estimate: f64,
    /// Provider attempts made by this caller.
    pub attempts: u32,
    /// True when the result came from another caller's record.
    pub cached: bool,
    /// Call fingerprint.
    pub fingerprint: String,
    /// Prompt characters.
    pub input_chars: usize,
    /// Response characters.
    pub output_chars: usize,
}

impl CallMeta {
    /// Metadata as a JSON object, for artifact meta.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The outcome of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// Raw response text.
    pub text: String,
    /// Parsed response for JSON-mode calls.
    pub json: Option<Value>,
    /// Usage and cache metadata.
    pub meta: CallMeta,
}

enum LockState {
    Held,
    Cached(CallRecord),
    Unlocked,
}

enum WaitOutcome {
    Settled(CallRecord),
    TimedOut(CallRecord),
    Vanished,
}

/// Executes generation calls at most once per fingerprint.
#[derive(Clone)]
pub struct CallDeduplicator {
    provider: Arc<dyn GenerationProvider>,
    calls: Arc<dyn CallRepository>,
    settings: DedupSettings,
}

impl std::fmt::Debug for CallDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDeduplicator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CallDeduplicator {
    /// Creates a deduplicator.
    #[must_use]
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        calls: Arc<dyn CallRepository>,
        settings: DedupSettings,
    ) -> Self {
        Self {
            provider,
            calls,
            settings,
        }
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &DedupSettings {
        &self.settings
    }

    /// Plain text call.
    pub async fn call_text(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        params: CallParams,
    ) -> Result<CallResult, GenerationError> {
        self.call(&CallRequest::new(system, user).with_params(params))
            .await
    }

    /// JSON call, validated against `schema` when given.
    pub async fn call_json(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        params: CallParams,
        schema: Option<Value>,
    ) -> Result<CallResult, GenerationError> {
        self.call(&CallRequest::new(system, user).with_params(params).json(schema))
            .await
    }

    /// Executes `request`, serving it from the call store when an identical
    /// call already succeeded.
    pub async fn call(&self, request: &CallRequest) -> Result<CallResult, GenerationError> {
        let model = request
            .params
            .model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone());
        check_input_limits(&request.system, &request.user, self.settings.max_chars_total)?;

        let fingerprint = call_fingerprint(
            &model,
            &request.system,
            &request.user,
            &request.params.fingerprint_params(request.json_mode),
            request.schema.as_ref(),
        );
        let input_chars = request.system.chars().count() + request.user.chars().count();

        if !self.settings.cache_enabled {
            let (response, attempts) = self.execute(request, &model, &fingerprint).await?;
            let json = interpret(request, &response.text)?;
            return Ok(fresh_result(response, json, attempts, &model, &fingerprint, input_chars));
        }

        match self.acquire(&fingerprint, &model).await? {
            LockState::Cached(record) => return cached_result(record, request, input_chars),
            LockState::Held => {}
            LockState::Unlocked => {
                tracing::warn!(
                    fingerprint = %short(&fingerprint),
                    "Call lock still contended; proceeding without it"
                );
            }
        }

        let outcome = match self.execute(request, &model, &fingerprint).await {
            Ok((response, attempts)) => {
                interpret(request, &response.text).map(|json| (response, json, attempts))
            }
            Err(e) => Err(e),
        };

        // Built locally so a store failure cannot discard a paid-for response.
        let base = CallRecord::in_progress(fingerprint.clone(), model.clone());

        match outcome {
            Ok((response, json, attempts)) => {
                let result = fresh_result(response, json, attempts, &model, &fingerprint, input_chars);
                let usage = CallUsage {
                    prompt_tokens: result.meta.prompt_tokens,
                    completion_tokens: result.meta.completion_tokens,
                    latency_ms: result.meta.latency_ms,
                    cost_estimate: result.meta.cost_estimate,
                    attempts,
                };
                let record = base.clone().succeeded(result.text.clone(), result.json.clone(), usage);
                if let Err(store_err) = self.calls.update(record).await {
                    tracing::warn!(
                        fingerprint = %short(&fingerprint),
                        error = %store_err,
                        "Failed to record call success; releasing lock"
                    );
                    self.release_failed(base, &fingerprint, store_err.to_string()).await;
                }
                tracing::info!(
                    fingerprint = %short(&fingerprint),
                    model = %model,
                    attempts,
                    total_tokens = result.meta.total_tokens,
                    cost = result.meta.cost_estimate,
                    "Generation call completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.release_failed(base, &fingerprint, e.to_string()).await;
                tracing::warn!(fingerprint = %short(&fingerprint), error = %e, "Generation call failed");
                Err(e)
            }
        }
    }

    /// Marks the held record `Failed` so waiters can reclaim it at once.
    async fn release_failed(&self, base: CallRecord, fingerprint: &str, error: String) {
        if let Err(store_err) = self.calls.update(base.failed(error)).await {
            tracing::warn!(
                fingerprint = %short(fingerprint),
                error = %store_err,
                "Failed to record call failure"
            );
        }
    }

    async fn acquire(&self, fingerprint: &str, model: &str) -> Result<LockState, GenerationError> {
        // Initial insert plus one retry after a reclaim attempt.
        for round in 0..2 {
            let claim = CallRecord::in_progress(fingerprint, model);
            let existing = match self.calls.insert_if_absent(claim).await? {
                InsertOutcome::Inserted => return Ok(LockState::Held),
                InsertOutcome::Conflict(record) => record,
            };

            let settled = match existing.status {
                CallStatus::Success => return Ok(LockState::Cached(existing)),
                CallStatus::InProgress if !self.is_stale(&existing) => {
                    tracing::debug!(fingerprint = %short(fingerprint), "Waiting on in-progress call");
                    match self.wait_for(fingerprint).await? {
                        WaitOutcome::Settled(record) if record.status == CallStatus::Success => {
                            return Ok(LockState::Cached(record));
                        }
                        WaitOutcome::Settled(record) | WaitOutcome::TimedOut(record) => record,
                        WaitOutcome::Vanished => continue,
                    }
                }
                _ => existing,
            };

            if (settled.status == CallStatus::Failed || self.is_stale(&settled))
                && self
                    .calls
                    .reclaim(fingerprint, settled.status, settled.updated_at)
                    .await?
            {
                tracing::info!(
                    fingerprint = %short(fingerprint),
                    previous = %settled.status,
                    "Reclaimed call lock"
                );
                return Ok(LockState::Held);
            }
            tracing::debug!(fingerprint = %short(fingerprint), round, "Lost reclaim race");
        }
        Ok(LockState::Unlocked)
    }

    async fn wait_for(&self, fingerprint: &str) -> Result<WaitOutcome, GenerationError> {
        let deadline = Instant::now() + self.settings.lock_timeout;
        loop {
            tokio::time::sleep(self.settings.poll_interval).await;
            match self.calls.get(fingerprint).await? {
                None => return Ok(WaitOutcome::Vanished),
                Some(record) if record.status.is_terminal() => {
                    return Ok(WaitOutcome::Settled(record));
                }
                Some(record) => {
                    if Instant::now() >= deadline {
                        return Ok(WaitOutcome::TimedOut(record));
                    }
                }
            }
        }
    }

    fn is_stale(&self, record: &CallRecord) -> bool {
        is_older_than(&record.updated_at, self.settings.lock_timeout, &now_utc())
    }

    async fn execute(
        &self,
        request: &CallRequest,
        model: &str,
        fingerprint: &str,
    ) -> Result<(ProviderResponse, u32), GenerationError> {
        let generation = GenerationRequest {
            system: request.system.clone(),
            user: request.user.clone(),
            model: model.to_string(),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            json_mode: request.json_mode,
            schema: request.schema.clone(),
        };
        let provider = &self.provider;
        let generation = &generation;
        let timeout = self.settings.request_timeout;

        with_retry(&self.settings.retry, short(fingerprint), move |attempt| async move {
            tracing::debug!(attempt, model = %generation.model, "Calling generation provider");
            let started = Instant::now();
            match tokio::time::timeout(timeout, provider.generate(generation)).await {
                Ok(Ok(mut response)) => {
                    if response.latency_ms == 0 {
                        response.latency_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    }
                    Ok(response)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(GenerationError::Timeout(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                ))),
            }
        })
        .await
    }
}

fn interpret(request: &CallRequest, text: &str) -> Result<Option<Value>, GenerationError> {
    if !request.json_mode {
        return Ok(None);
    }
    let value = parse_json_response(text)?;
    if let Some(ref schema) = request.schema {
        validate_schema(&value, schema)?;
    }
    Ok(Some(value))
}

fn fresh_result(
    response: ProviderResponse,
    json: Option<Value>,
    attempts: u32,
    model: &str,
    fingerprint: &str,
    input_chars: usize,
) -> CallResult {
    let meta = CallMeta {
        model: model.to_string(),
        latency_ms: response.latency_ms,
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
        total_tokens: response.prompt_tokens + response.completion_tokens,
        cost_estimate: estimate_cost(model, response.prompt_tokens, response.completion_tokens),
        attempts,
        cached: false,
        fingerprint: fingerprint.to_string(),
        input_chars,
        output_chars: response.text.chars().count(),
    };
    CallResult {
        text: response.text,
        json,
        meta,
    }
}

fn cached_result(
    record: CallRecord,
    request: &CallRequest,
    input_chars: usize,
) -> Result<CallResult, GenerationError> {
    let text = record.response_text.unwrap_or_default();
    let json = match record.response_json {
        Some(value) => Some(value),
        None => interpret(request, &text)?,
    };
    tracing::debug!(fingerprint = %short(&record.fingerprint), "Generation call served from cache");
    Ok(CallResult {
        meta: CallMeta {
            model: record.model,
            latency_ms: 0,
            prompt_tokens: record.usage.prompt_tokens,
            completion_tokens: record.usage.completion_tokens,
            total_tokens: record.usage.prompt_tokens + record.usage.completion_tokens,
            cost_estimate: 0.0,
            attempts: 0,
            cached: true,
            fingerprint: record.fingerprint,
            input_chars,
            output_chars: text.chars().count(),
        },
        text,
        json,
    })
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
