//! Async side of the fee refresh cycle.
//!
//! - `refresh` exposes `RefreshController`, which starts and stops runs.
//! - `lifecycle` wires the run token, driver task, and metrics reporter.
//! - `driver` is the serialized event loop applying `RefreshMachine` effects.
//! - `timer` provides the cancellable one-shot and periodic timers.
//! - `handle` is the caller-facing `RefreshHandle`.

pub(crate) mod driver;
pub mod handle;
pub(crate) mod lifecycle;
pub mod refresh;
pub mod timer;

pub use handle::RefreshHandle;
pub use refresh::RefreshController;
pub use timer::Timer;
