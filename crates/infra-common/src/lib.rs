//! Common infrastructure for the siphon SIP stack
//!
//! This crate holds the pieces every other siphon crate leans on but that carry
//! no SIP semantics of their own:
//!
//! - [`errors`]: base error type and error context helpers
//! - [`logging`]: `tracing` subscriber setup and logging contexts
//! - [`config`]: layered configuration loading (TOML file + environment)
//! - [`events`]: typed listener registries used for lifecycle notifications

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;

pub use errors::types::{Error, Result};
pub use events::listeners::{ListenerId, ListenerRegistry};
