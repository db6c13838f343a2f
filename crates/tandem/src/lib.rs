//! Tandem is a provider-agnostic exchange layer for large language
//! models: callers issue one logical request and get one canonical
//! result, no matter which backing provider answered it.
//!
//! The crate normalizes heterogeneous provider wire formats into one
//! message/content model, turns push-style provider streams into a
//! pull-based idempotent state machine, dispatches mixed sync/async tool
//! calls, enforces structured output through a correction-retry loop,
//! chains sequential provider fallbacks with full failure provenance,
//! and round-trips a finished exchange through a portable byte form.
//! Vendor HTTP clients live outside the crate, behind
//! [`providers::base::Provider`].
pub mod errors;
pub mod fallback;
pub mod model;
pub mod models;
pub mod providers;
pub mod response;
pub mod serialization;
pub mod stream;
pub mod structured;
pub mod toolkit;
