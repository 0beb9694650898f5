//! Core types and configuration shared by the school management client crates

pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiConfig, ClientConfig, SessionConfig};
pub use error::{CoreError, CoreResult};
pub use types::{ExecutionContext, Role, TokenPair, User};
