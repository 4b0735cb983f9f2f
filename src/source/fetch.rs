//! The fetch collaborator consumed by the refresh controller and the error it
//! reports. Sources are free to retry internally; the controller treats every
//! returned error as a single retryable failure.

use super::fees::{Endpoint, Fees};
use anyhow::Error as AnyError;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    Decode,
    Timeout,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Transport => f.write_str("transport error"),
            FetchErrorKind::Decode => f.write_str("decode error"),
            FetchErrorKind::Timeout => f.write_str("timeout"),
        }
    }
}

/// Failure of a single fee fetch. Cheap to clone so it can live inside
/// published snapshots.
#[derive(Clone)]
pub struct FetchError {
    kind: FetchErrorKind,
    endpoint: Endpoint,
    source: Arc<AnyError>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, endpoint: Endpoint, source: AnyError) -> Self {
        Self {
            kind,
            endpoint,
            source: Arc::new(source),
        }
    }

    pub fn transport(endpoint: Endpoint, source: AnyError) -> Self {
        Self::new(FetchErrorKind::Transport, endpoint, source)
    }

    pub fn timeout(endpoint: Endpoint, after: std::time::Duration) -> Self {
        Self::new(
            FetchErrorKind::Timeout,
            endpoint,
            anyhow::anyhow!("no response after {}ms", after.as_millis()),
        )
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchError")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetching fees from {}: {}",
            self.kind, self.endpoint, self.source
        )
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref().as_ref())
    }
}

/// Errors compare by kind and endpoint; the underlying cause is diagnostic only.
impl PartialEq for FetchError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.endpoint == other.endpoint
    }
}

impl Eq for FetchError {}

/// Anything able to produce a fee snapshot for an endpoint.
pub trait FeeSource: Send + Sync + 'static {
    fn fetch_fees<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Fees, FetchError>>;
}

/// Adapts an async closure into a [`FeeSource`].
pub struct FnSource<F> {
    fetch: F,
}

pub fn source_fn<F, Fut>(fetch: F) -> FnSource<F>
where
    F: Fn(Endpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fees, FetchError>> + Send + 'static,
{
    FnSource { fetch }
}

impl<F, Fut> FeeSource for FnSource<F>
where
    F: Fn(Endpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fees, FetchError>> + Send + 'static,
{
    fn fetch_fees<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Fees, FetchError>> {
        Box::pin((self.fetch)(endpoint.clone()))
    }
}
