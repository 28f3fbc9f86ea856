//! Shared test doubles for the turn pipeline.

use async_trait::async_trait;
use roomcast_core::error::ProviderError;
use roomcast_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use roomcast_core::search::WebSearch;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// How one streaming call should behave.
#[derive(Clone)]
pub enum Script {
    /// Emit each delta after waiting `gap`, then finish.
    Deltas { deltas: Vec<String>, gap: Duration },
    /// Emit the deltas, then fail mid-stream.
    FailAfter { deltas: Vec<String>, error: ProviderError },
    /// Refuse the request outright.
    Reject(ProviderError),
    /// Never produce anything.
    Hang,
}

impl Script {
    pub fn text(parts: &[&str]) -> Self {
        Self::Deltas {
            deltas: parts.iter().map(|s| s.to_string()).collect(),
            gap: Duration::ZERO,
        }
    }

    pub fn paced(parts: &[&str], gap: Duration) -> Self {
        Self::Deltas {
            deltas: parts.iter().map(|s| s.to_string()).collect(),
            gap,
        }
    }
}

/// A provider that replays scripted streams and records every request.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more scripts");

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        match script {
            Script::Reject(error) => return Err(error),
            Script::Hang => {
                tokio::spawn(async move {
                    std::future::pending::<()>().await;
                    drop(tx);
                });
            }
            Script::Deltas { deltas, gap } => {
                tokio::spawn(async move {
                    for delta in deltas {
                        if !gap.is_zero() {
                            tokio::time::sleep(gap).await;
                        }
                        if tx.send(Ok(StreamChunk::delta(delta))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamChunk::done())).await;
                });
            }
            Script::FailAfter { deltas, error } => {
                tokio::spawn(async move {
                    for delta in deltas {
                        let _ = tx.send(Ok(StreamChunk::delta(delta))).await;
                    }
                    let _ = tx.send(Err(error)).await;
                });
            }
        }
        Ok(rx)
    }
}

/// A search backend returning a fixed payload and recording queries.
pub struct FixedSearch {
    payload: String,
    queries: Mutex<Vec<String>>,
}

impl FixedSearch {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for FixedSearch {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn search(&self, query: &str) -> String {
        self.queries.lock().unwrap().push(query.to_string());
        self.payload.clone()
    }
}
