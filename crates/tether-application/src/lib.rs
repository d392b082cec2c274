//! Application layer for Tether.
//!
//! Runs one actor per protocol session, keeps them addressable through a
//! registry, and rebuilds them from the session store after a restart.

pub mod registry;
pub mod session;
pub mod supervisor;

pub use registry::SessionRegistry;
pub use session::{ServerContext, SessionActor, SessionHandle};
pub use supervisor::{RecoveryReport, RestartPolicy, SessionSupervisor};
