//! The adapter contract between vendor clients and the core.
//!
//! Actual network clients live outside this crate; an adapter implements
//! [`base::Provider`] by decoding its vendor's native payloads into the
//! canonical models and translating its native event stream into chunk
//! order as received.
pub mod base;
pub mod registry;

#[cfg(test)]
pub mod mock;
