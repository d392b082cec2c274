//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Session state, persisted projection and partial updates
//! - `stored`: Store-returned record shapes and their normalization
//! - `store`: Store trait, options and errors

mod model;
mod store;
mod stored;

// Re-export public API
pub use model::{LogLevel, SessionPatch, SessionRecord, SessionState};
pub use store::{SessionStore, StoreError, StoreOptions, StoreResult};
pub use stored::StoredRecord;
