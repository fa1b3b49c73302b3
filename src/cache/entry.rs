//! Per-key cache entries and the state machine they move through.

use crate::error::TrawlError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Where the current value of an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    SeededFromServer,
    FetchedFromClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Holds a server-rendered seed and was never fetched by the client
    Seeded,
    /// A fetch is in flight; any previous value stays visible
    Validating,
    Fresh,
    /// Last fetch failed; the last good value, if any, is still held
    Failed,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Seeded => "seeded",
            EntryState::Validating => "validating",
            EntryState::Fresh => "fresh",
            EntryState::Failed => "failed",
        }
    }
}

/// What a subscriber sees of an entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryView {
    pub state: EntryState,
    pub value: Option<Value>,
    pub error: Option<TrawlError>,
    pub origin: Origin,
}

impl EntryView {
    pub fn is_validating(&self) -> bool {
        self.state == EntryState::Validating
    }

    /// Deserialize the held value, if any.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, TrawlError>> {
        self.value
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()).map_err(TrawlError::from))
    }

    /// The value if the entry is healthy, otherwise its error.
    pub fn into_result(self) -> Result<Value, TrawlError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.value
            .ok_or_else(|| TrawlError::Internal("entry settled without a value".into()))
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Option<Value>,
    error: Option<TrawlError>,
    validating: bool,
    origin: Origin,
    fetch_started_at: Option<Instant>,
}

impl CacheEntry {
    pub fn seeded(value: Value) -> Self {
        Self {
            value: Some(value),
            error: None,
            validating: false,
            origin: Origin::SeededFromServer,
            fetch_started_at: None,
        }
    }

    /// Entry for a key first requested on the client; a fetch starts right away.
    pub fn loading() -> Self {
        Self {
            value: None,
            error: None,
            validating: false,
            origin: Origin::FetchedFromClient,
            fetch_started_at: None,
        }
    }

    pub fn state(&self) -> EntryState {
        if self.validating {
            EntryState::Validating
        } else if self.error.is_some() {
            EntryState::Failed
        } else if self.origin == Origin::SeededFromServer {
            EntryState::Seeded
        } else {
            EntryState::Fresh
        }
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn error(&self) -> Option<&TrawlError> {
        self.error.as_ref()
    }

    /// Value and error are kept until the fetch settles.
    pub fn begin_validation(&mut self, now: Instant) {
        self.validating = true;
        self.fetch_started_at = Some(now);
    }

    pub fn settle(&mut self, result: Result<Value, TrawlError>) {
        self.validating = false;
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
                self.origin = Origin::FetchedFromClient;
            }
            Err(err) => {
                self.error = Some(err);
            }
        }
    }

    /// Whether a fetch started less than `window` ago.
    pub fn within_dedup_window(&self, now: Instant, window: Duration) -> bool {
        self.fetch_started_at
            .map_or(false, |started| now.saturating_duration_since(started) < window)
    }

    pub fn view(&self) -> EntryView {
        EntryView {
            state: self.state(),
            value: self.value.clone(),
            error: self.error.clone(),
            origin: self.origin,
        }
    }
}
