//! Event notification primitives

pub mod listeners;

pub use listeners::{ListenerId, ListenerRegistry};
