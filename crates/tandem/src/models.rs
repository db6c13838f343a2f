//! The canonical value types passed between callers, providers, and tools.
//!
//! Every provider adapter decodes its native wire format into these types
//! and never hands vendor structs to the rest of the crate. The shapes are
//! deliberately provider-neutral: close enough to each vendor API to map
//! losslessly, identical no matter which vendor answered. The one escape
//! hatch is `AssistantMessage::raw_message`, an opaque payload kept
//! verbatim so a follow-up request to the *same* provider can resume with
//! full fidelity.
pub mod content;
pub mod format;
pub mod message;
pub mod tool;
pub mod usage;
