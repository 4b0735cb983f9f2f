pub mod controller;
pub mod runtime;
pub mod source;
pub mod state;

pub use controller::{RefreshController, RefreshHandle};
pub use runtime::config::{RefreshConfig, RefreshConfigBuilder, RefreshConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use source::{source_fn, Endpoint, FeeSource, Fees, FetchError, FetchErrorKind};
pub use state::{AsyncValue, Context, FeesValue, Phase, RefreshSnapshot};
