pub mod model;
pub mod session;
pub mod store;

pub use session::{Session, SessionProvider, TokenSessions};
pub use store::{RunPage, RunQuery, Store};
