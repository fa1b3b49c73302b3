//! In-process fetcher for controller tests.

use crate::cache::fetcher::{FetchResult, Fetcher};
use crate::cache::key::CacheKey;
use crate::error::TrawlError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Answers each key with a scripted result and counts calls. A gated fetcher
/// holds every call until the test adds a permit to the gate.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, FetchResult>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (fetcher, gate)
    }

    pub fn respond(&self, key: &str, result: FetchResult) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), result);
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, key: &CacheKey) -> FetchResult {
        self.calls.lock().unwrap().push(key.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.responses
            .lock()
            .unwrap()
            .get(key.as_str())
            .cloned()
            .unwrap_or_else(|| Err(TrawlError::Internal(format!("no scripted response for {}", key))))
    }
}
