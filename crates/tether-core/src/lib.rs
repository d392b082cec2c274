//! Domain layer for Tether: session state, store contract and configuration.

pub mod config;
pub mod error;
pub mod session;

// Re-export common error type
pub use error::{Result, TetherError};
