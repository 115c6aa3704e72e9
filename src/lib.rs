//! certmill is a certificate lifecycle manager. It owns a collection of X.509
//! certificates (root CA, intermediate CA, end-entity), keeps them valid over
//! time by scheduled renewal, and deploys each renewed artifact to the places
//! that consume it: local files, containers, remote hosts, reverse proxies and
//! notification channels.

pub mod adapters;
pub mod api;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod model;
pub mod renewal;
pub mod store;
pub mod vault;
pub mod watch;

// Re-export commonly used types
pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
pub use crate::model::certificate::Certificate;

/// Result type for certmill operations
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
