//! Fee payload types and the fetch collaborator contract.

pub mod fees;
pub mod fetch;

pub use fees::{Endpoint, Fees};
pub use fetch::{source_fn, FeeSource, FetchError, FetchErrorKind, FnSource};
