//! Standalone siphon server
//!
//! The binary wires [`DefaultHandler`] to a UDP transport. The handler is also
//! usable as a starting point, or as a fallback stage in larger applications.

pub mod args;
pub mod handler;

pub use args::Args;
pub use handler::DefaultHandler;
