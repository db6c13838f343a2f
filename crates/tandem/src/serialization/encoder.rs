use chrono::Utc;

use crate::errors::{LlmError, LlmResult};
use crate::response::Response;

use super::payload::{current_schema, Metadata, SerializedResponse, CURRENT_VERSION};

/// Encode a `Response` to JSON bytes.
pub fn encode(response: &Response) -> LlmResult<Vec<u8>> {
    let payload = build_payload(response);
    serde_json::to_vec(&payload).map_err(|e| LlmError::Internal(format!("encode failed: {e}")))
}

/// Encode a `Response` to a JSON string.
pub fn encode_string(response: &Response) -> LlmResult<String> {
    let payload = build_payload(response);
    serde_json::to_string(&payload).map_err(|e| LlmError::Internal(format!("encode failed: {e}")))
}

fn build_payload(response: &Response) -> SerializedResponse {
    SerializedResponse {
        schema: current_schema(),
        version: CURRENT_VERSION.to_string(),
        kind: "response".to_string(),
        provider: response.provider_id.clone(),
        model_id: response.model_id.clone(),
        provider_model_name: response.provider_model_name.clone(),
        messages: response.messages(),
        metadata: Metadata {
            serialized_at: Utc::now().to_rfc3339(),
            library_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        finish_reason: response.finish_reason,
        params: response.params.clone(),
        tools: if response.tools.is_empty() {
            None
        } else {
            Some(response.tools.clone())
        },
        format: response.format.clone(),
        usage: response.usage.clone(),
    }
}
