pub mod config;
pub mod sessions;
