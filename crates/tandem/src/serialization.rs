//! Round-trip serialization of a finished exchange.
//!
//! The encoded form is a self-describing JSON blob: schema tag, payload
//! version, metadata, and every canonical field of the `Response`,
//! including opaque `raw_message` payloads. Callables are never carried —
//! tools and formats are embedded as schemas only, and the caller
//! supplies the live objects again at decode time for revalidation.
pub mod decoder;
pub mod encoder;
pub mod payload;

pub use decoder::decode;
pub use encoder::{encode, encode_string};
