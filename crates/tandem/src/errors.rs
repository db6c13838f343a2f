use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of errors, used by fallback `catch` matching.
///
/// Provider adapters pick the kind closest to their native failure; the
/// core never branches on it outside of `fallback`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Timeout,
    Connection,
    Authentication,
    Api,
    Tool,
    Validation,
    Stream,
    Decode,
    Fallback,
    Other,
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("Invalid tool parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Tool '{0}' is async and cannot be dispatched synchronously")]
    AsyncTool(String),
}

/// A structured-output schema mismatch.
///
/// Carries every individual violation so a correction round can show the
/// model exactly what was wrong.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Response did not match the requested format: {}", violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    pub fn single<S: Into<String>>(violation: S) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }
}

/// A failure while draining a chunk source.
///
/// Cloneable so an errored stream can cache it and return the same error
/// verbatim on every subsequent `finish()`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Stream from {provider_id}/{model_id} failed: {message}")]
pub struct StreamError {
    pub provider_id: String,
    pub model_id: String,
    pub message: String,
}

impl StreamError {
    pub fn new<P, M, S>(provider_id: P, model_id: M, message: S) -> Self
    where
        P: Into<String>,
        M: Into<String>,
        S: Into<String>,
    {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            message: message.into(),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("Invalid serialized data: {0}")]
    InvalidJson(String),

    #[error("Invalid serialized payload: {0}")]
    InvalidPayload(String),

    #[error("Schema mismatch: expected '{expected}', got '{found}'")]
    SchemaMismatch { expected: String, found: String },

    #[error("Cannot decode version {found} with decoder version {expected}")]
    IncompatibleVersion { found: String, expected: String },

    #[error("Incompatible tools: {0}")]
    IncompatibleTools(String),

    #[error("Incompatible format: {0}")]
    IncompatibleFormat(String),
}

/// One failed attempt inside a fallback chain, in attempt order.
///
/// `provider`/`model` are `None` for the primary call, which runs with the
/// caller's own configuration rather than a fallback entry's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaughtError {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub error: LlmError,
}

/// Every attempt in a fallback chain failed.
///
/// The `caught` list preserves the full provenance; nothing is dropped.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("All fallback attempts failed: {}", render_caught(caught))]
pub struct FallbackError {
    pub caught: Vec<CaughtError>,
}

fn render_caught(caught: &[CaughtError]) -> String {
    let attempts: Vec<String> = caught
        .iter()
        .enumerate()
        .map(|(i, c)| match (&c.provider, &c.model) {
            (Some(provider), Some(model)) => {
                format!("[{i}] {provider}/{model}: {}", c.error)
            }
            _ => format!("[{i}] primary: {}", c.error),
        })
        .collect();
    attempts.join("; ")
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LlmError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    /// An opaque provider/network failure. The core never catches these
    /// itself; they propagate unless a fallback chain intercepts them.
    #[error("Provider '{provider_id}' failed ({kind}): {message}")]
    Provider {
        provider_id: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn provider<P, S>(provider_id: P, kind: ErrorKind, message: S) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        LlmError::Provider {
            provider_id: provider_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// The coarse class of this error, for fallback `catch` matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Tool(_) => ErrorKind::Tool,
            LlmError::Validation(_) => ErrorKind::Validation,
            LlmError::Stream(_) => ErrorKind::Stream,
            LlmError::Decode(_) => ErrorKind::Decode,
            LlmError::Fallback(_) => ErrorKind::Fallback,
            LlmError::Provider { kind, .. } => *kind,
            LlmError::UnknownProvider(_) => ErrorKind::Other,
            LlmError::Internal(_) => ErrorKind::Other,
        }
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;
