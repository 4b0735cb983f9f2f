//! Pure refresh state: the `AsyncValue` container, the machine context, retry
//! and polling arithmetic, and the transition function itself.

pub mod async_value;
pub mod backoff;
pub mod context;
pub mod machine;

pub use async_value::AsyncValue;
pub use backoff::{PollSchedule, RetryBackoff, RetryDisposition};
pub use context::{Context, FeesValue, Phase, RefreshSnapshot};
pub use machine::{AttemptId, Effect, Event, RefreshMachine, Step, StepOutcome};
