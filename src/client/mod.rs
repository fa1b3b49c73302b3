//! Client side of trawl: the HTTP fetcher, write actions and the initial
//! seed supplier.

pub mod actions;
pub mod api;
pub mod seed;

pub use actions::{MutationActions, MutationOutcome};
pub use api::{ApiClient, DEFAULT_REQUEST_TIMEOUT};
pub use seed::prefetch_seeds;
