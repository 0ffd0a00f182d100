//! SIP headers: the static [`registry`] of well-known names, [`HeaderName`],
//! decoded [`HeaderValue`]s and the ordered [`Headers`] multimap.

mod fields;
mod name;
pub mod registry;

pub use fields::{HeaderField, HeaderValue, Headers};
pub use name::HeaderName;
pub use registry::{HeaderKind, SipHeader};
