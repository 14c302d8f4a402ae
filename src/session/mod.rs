//! Sessions: the persisted record, its storage slot and the manager that
//! drives login, signup, refresh and expiry.

mod config;
mod manager;
mod storage;
mod types;

pub use config::SessionConfig;
pub use manager::{DEFAULT_SESSION_TTL, SessionManager};
pub use storage::{FileSessionStorage, InMemorySessionStorage, SESSION_STORAGE_KEY, SessionStorage};
pub use types::{Session, SessionState};
