use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting for one completed exchange.
///
/// Every count is nullable because providers report different subsets;
/// `raw` keeps the provider's native usage block for anything the
/// canonical fields do not cover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub cache_read_tokens: Option<i32>,
    pub cache_write_tokens: Option<i32>,
    pub reasoning_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_tool_usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl Usage {
    pub fn new(input_tokens: Option<i32>, output_tokens: Option<i32>) -> Self {
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
            ..Default::default()
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(25));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(25));
        assert_eq!(usage.total_tokens, Some(35));
        assert_eq!(usage.cache_read_tokens, None);
    }

    #[test]
    fn test_usage_total_unknown_when_partial() {
        let usage = Usage::new(Some(10), None);
        assert_eq!(usage.total_tokens, None);
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(25)).with_raw(json!({"billed": 35}));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let value: Value = serde_json::from_str(&serialized)?;
        assert_eq!(value["input_tokens"], json!(10));
        assert_eq!(value["total_tokens"], json!(35));
        assert_eq!(value["raw"]["billed"], json!(35));
        Ok(())
    }
}
