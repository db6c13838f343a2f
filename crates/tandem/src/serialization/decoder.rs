use crate::errors::DecodeError;
use crate::models::format::Format;
use crate::models::message::Message;
use crate::models::tool::ToolSchema;
use crate::response::{Params, Response};

use super::payload::{SerializationVersion, SerializedResponse, CURRENT_VERSION, SCHEMA_PREFIX};

/// Decode an encoded exchange back into a `Response`.
///
/// `tools` and `format` are the caller's live objects, supplied again
/// because callables are never embedded in the blob (use
/// `Toolkit::schemas()` for the tool side). When the blob carries tool or
/// format schemas, the supplied objects are validated against them: tools
/// must be a superset with identical schemas, the format schema must be
/// equal. Malformed or incompatible payloads fail outright — no partial
/// `Response` is ever returned.
///
/// `params` encoded as null decodes to an empty map; this normalization
/// is deliberate, not data loss.
pub fn decode(
    data: impl AsRef<[u8]>,
    tools: Option<&[ToolSchema]>,
    format: Option<&Format>,
) -> Result<Response, DecodeError> {
    let payload: SerializedResponse = serde_json::from_slice(data.as_ref())
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    decode_payload(payload, tools, format)
}

fn decode_payload(
    payload: SerializedResponse,
    tools: Option<&[ToolSchema]>,
    format: Option<&Format>,
) -> Result<Response, DecodeError> {
    validate_version(&payload.version)?;
    validate_schema(&payload.schema, &payload.version)?;

    if payload.kind != "response" {
        return Err(DecodeError::InvalidPayload(format!(
            "unknown payload type: {}",
            payload.kind
        )));
    }

    let mut messages = payload.messages;
    let assistant_message = match messages.pop() {
        Some(Message::Assistant(message)) => message,
        Some(other) => {
            let role = match other {
                Message::System(_) => "system",
                Message::User(_) => "user",
                Message::Assistant(_) => "assistant",
            };
            return Err(DecodeError::InvalidPayload(format!(
                "last message must be an assistant message, got {role}"
            )));
        }
        None => {
            return Err(DecodeError::InvalidPayload(
                "payload must contain at least one message".to_string(),
            ))
        }
    };

    validate_tools(payload.tools.as_deref(), tools)?;
    validate_format(payload.format.as_ref(), format)?;

    let attached_tools = match (tools, payload.tools) {
        (Some(tools), _) => tools.to_vec(),
        (None, Some(serialized)) => serialized,
        (None, None) => Vec::new(),
    };
    let attached_format = format.cloned().or(payload.format);

    Ok(Response {
        provider_id: payload.provider,
        model_id: payload.model_id,
        provider_model_name: payload.provider_model_name,
        params: Some(payload.params.unwrap_or_else(Params::new)),
        tools: attached_tools,
        format: attached_format,
        input_messages: messages,
        assistant_message,
        finish_reason: payload.finish_reason,
        usage: payload.usage,
    })
}

fn validate_version(version: &str) -> Result<(), DecodeError> {
    let found = SerializationVersion::parse(version)?;
    let current = SerializationVersion::parse(CURRENT_VERSION)?;
    if !found.is_compatible_with(&current) {
        return Err(DecodeError::IncompatibleVersion {
            found: found.to_string(),
            expected: current.to_string(),
        });
    }
    Ok(())
}

fn validate_schema(schema: &str, version: &str) -> Result<(), DecodeError> {
    let major = version.split('.').next().unwrap_or_default();
    let expected = format!("{SCHEMA_PREFIX}{major}");
    if schema != expected {
        return Err(DecodeError::SchemaMismatch {
            expected,
            found: schema.to_string(),
        });
    }
    Ok(())
}

/// Provided tools must be a superset of the serialized tools, with
/// identical schemas.
fn validate_tools(
    serialized: Option<&[ToolSchema]>,
    provided: Option<&[ToolSchema]>,
) -> Result<(), DecodeError> {
    let serialized = match serialized {
        Some(serialized) if !serialized.is_empty() => serialized,
        _ => return Ok(()),
    };

    let provided = provided.ok_or_else(|| {
        let names: Vec<&str> = serialized.iter().map(|t| t.name.as_str()).collect();
        DecodeError::IncompatibleTools(format!(
            "payload contains tools {names:?} but no tools were provided"
        ))
    })?;

    for tool in serialized {
        let matching = provided
            .iter()
            .find(|p| p.name == tool.name)
            .ok_or_else(|| {
                DecodeError::IncompatibleTools(format!(
                    "serialized tool '{}' not found in provided tools",
                    tool.name
                ))
            })?;
        if matching.parameters != tool.parameters {
            return Err(DecodeError::IncompatibleTools(format!(
                "tool '{}' parameter schema mismatch",
                tool.name
            )));
        }
        if matching.strict != tool.strict {
            return Err(DecodeError::IncompatibleTools(format!(
                "tool '{}' strict mode mismatch",
                tool.name
            )));
        }
    }
    Ok(())
}

/// The provided format's schema must equal the serialized one.
fn validate_format(
    serialized: Option<&Format>,
    provided: Option<&Format>,
) -> Result<(), DecodeError> {
    let serialized = match serialized {
        Some(serialized) => serialized,
        None => return Ok(()),
    };

    let provided = provided.ok_or_else(|| {
        DecodeError::IncompatibleFormat(format!(
            "payload contains format '{}' but no format was provided",
            serialized.name
        ))
    })?;

    if provided.schema != serialized.schema {
        return Err(DecodeError::IncompatibleFormat(format!(
            "format schema mismatch for '{}'",
            serialized.name
        )));
    }
    Ok(())
}
