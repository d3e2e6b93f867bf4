//! The generation client: provider contract, fingerprinting, retry and the
//! call deduplicator.

mod cost;
mod dedup;
mod fingerprint;
#[cfg(feature = "http-provider")]
mod http;
mod limits;
mod provider;
mod response;
mod retry;

pub use cost::{estimate_cost, pricing_for, ModelPricing};
pub use dedup::{CallDeduplicator, CallMeta, CallParams, CallRequest, CallResult, DedupSettings};
pub use fingerprint::{call_fingerprint, normalize_params, schema_hash};
#[cfg(feature = "http-provider")]
pub use http::HttpProvider;
pub use limits::check_input_limits;
pub use provider::{GenerationProvider, GenerationRequest, ProviderResponse};
pub use response::{clean_json_response, parse_json_response, validate_schema};
pub use retry::{with_retry, RetryDecision, RetryPolicy};
