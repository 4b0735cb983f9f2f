use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use feewatch::{Endpoint, FeeSource, Fees, FetchError};
use futures::future::BoxFuture;
use tokio::time::sleep;

/// One scripted answer: an outcome delivered after an optional delay.
#[derive(Clone, Debug)]
pub struct Scripted {
    delay: Duration,
    outcome: Result<Fees, String>,
}

impl Scripted {
    pub fn ok(fees: Fees) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(fees),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(reason.into()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Scripted>,
    calls: Vec<Endpoint>,
}

/// Fee source answering from a queue of scripted responses and recording
/// which endpoints were requested. An exhausted script fails every call.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSource {
    pub fn new(responses: impl IntoIterator<Item = Scripted>) -> Self {
        let source = Self::default();
        source.push(responses);
        source
    }

    pub fn push(&self, responses: impl IntoIterator<Item = Scripted>) {
        let mut state = self.state.lock().expect("script state poisoned");
        state.responses.extend(responses);
    }

    pub fn calls(&self) -> Vec<Endpoint> {
        self.state
            .lock()
            .expect("script state poisoned")
            .calls
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().expect("script state poisoned").calls.len()
    }
}

impl FeeSource for ScriptedSource {
    fn fetch_fees<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Fees, FetchError>> {
        let scripted = {
            let mut state = self.state.lock().expect("script state poisoned");
            state.calls.push(endpoint.clone());
            state.responses.pop_front()
        };

        Box::pin(async move {
            let Some(Scripted { delay, outcome }) = scripted else {
                return Err(FetchError::transport(
                    endpoint.clone(),
                    anyhow!("script exhausted"),
                ));
            };

            if !delay.is_zero() {
                sleep(delay).await;
            }
            outcome.map_err(|reason| FetchError::transport(endpoint.clone(), anyhow!(reason)))
        })
    }
}
