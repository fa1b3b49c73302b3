//! Client-side read-through cache for trawl.
//!
//! This module provides:
//! - A key space mapping resource queries to stable keys (which double as
//!   request paths)
//! - Envelope decoding for API replies
//! - The cache controller with server seeding, first-commit pause, request
//!   deduplication and stale-while-revalidate entries
//! - Focus, reconnect and periodic revalidation triggers

pub mod controller;
pub mod entry;
pub mod envelope;
pub mod fetcher;
pub mod key;
pub mod triggers;

#[cfg(test)]
pub mod testing;

pub use controller::{CacheController, ControllerConfig, PendingFetch, Subscription};
pub use entry::{EntryState, EntryView, Origin};
pub use envelope::{Envelope, PageInfo, Paginated};
pub use fetcher::{FetchResult, Fetcher};
pub use key::{CacheKey, ListFilter, ResourceKind};
pub use triggers::Trigger;
