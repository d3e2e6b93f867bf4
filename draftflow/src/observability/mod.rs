//! Observability utilities: subscriber setup and step timing.

mod tracing;

pub use self::tracing::{init_tracing, SpanTimer, StepSpanAttributes};
