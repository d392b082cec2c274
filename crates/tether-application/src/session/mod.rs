//! Session actors.
//!
//! - `actor`: the per-session task and its command set
//! - `handle`: the address other components call through
//! - `context`: per-server settings shared by every actor

mod actor;
mod context;
mod handle;

pub use actor::SessionActor;
pub use context::ServerContext;
pub use handle::SessionHandle;
