//! Assignment scheduling and double-booking engine for project staffing.

pub mod config;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use notify::{Notifier, NotifyHub};
pub use store::{MemoryStore, Store, StoreError};
