//! Error types for Tether.

use crate::session::StoreError;
use thiserror::Error;

/// A shared error type for the Tether crates.
///
/// Store failures are carried as [`StoreError`] so callers can still tell
/// "no store configured" apart from a failing backend after conversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TetherError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The session actor has stopped or never became ready
    #[error("Session actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl TetherError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an ActorUnavailable error
    pub fn actor_unavailable(session_id: impl Into<String>) -> Self {
        Self::ActorUnavailable(session_id.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a store error
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Check if the target actor is gone
    pub fn is_actor_unavailable(&self) -> bool {
        matches!(self, Self::ActorUnavailable(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<toml::de::Error> for TetherError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, TetherError>`.
pub type Result<T> = std::result::Result<T, TetherError>;
