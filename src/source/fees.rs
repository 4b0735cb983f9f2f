//! Fee snapshot payload and the endpoint identifier it is fetched from.

use super::fetch::{FetchError, FetchErrorKind};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "mempool";

/// Recommended fee rates in sat/vB, as served by mempool-style
/// `/api/v1/fees/recommended` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub fastest_fee: u64,
    pub half_hour_fee: u64,
    pub hour_fee: u64,
    pub economy_fee: u64,
    pub minimum_fee: u64,
}

impl Fees {
    /// Decodes the JSON body returned by a fee endpoint.
    pub fn from_json(endpoint: &Endpoint, body: &[u8]) -> Result<Self, FetchError> {
        serde_json::from_slice(body).map_err(|err| {
            FetchError::new(
                FetchErrorKind::Decode,
                endpoint.clone(),
                anyhow::Error::new(err).context("invalid fee recommendation payload"),
            )
        })
    }
}

/// Names the upstream a fee snapshot is requested from. The refresh machinery
/// only stores and forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Arc<str>);

impl Endpoint {
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            bail!("endpoint cannot be empty");
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_ENDPOINT))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
