//! Typed SIP values: methods, status codes, URIs, parameters and the structured
//! header values (addresses, Via hops, CSeq).

pub mod address;
pub mod cseq;
pub mod method;
pub mod param;
pub mod status;
pub mod uri;
pub mod via;

pub use address::Address;
pub use cseq::CSeq;
pub use method::Method;
pub use param::Params;
pub use status::StatusCode;
pub use uri::Uri;
pub use via::Via;
