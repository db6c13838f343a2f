use indoc::formatdoc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool::ToolSchema;

/// Name of the synthetic tool used when a format runs in `Tool` mode.
pub const FORMATTED_OUTPUT_TOOL: &str = "__formatted_output_tool__";

/// How the model is told to produce the structured output.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormatMode {
    /// Instructions in a system message ask for JSON text.
    Json,
    /// A synthetic forced tool call carries the output as its arguments.
    Tool,
    /// The provider's native structured-output support enforces the
    /// schema; the response is still JSON text.
    Strict,
}

/// The desired shape of a structured response.
///
/// Invariants, upheld by the constructors: `Json` mode always has
/// non-empty `formatting_instructions` (surfaced as, or merged into, a
/// system message); `Tool` mode contributes exactly one synthetic
/// [`FORMATTED_OUTPUT_TOOL`] schema to the effective tool list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
    pub mode: FormatMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatting_instructions: Option<String>,
}

impl Format {
    pub fn new<N: Into<String>>(name: N, schema: Value, mode: FormatMode) -> Self {
        let name = name.into();
        let formatting_instructions = match mode {
            FormatMode::Json => Some(Self::default_instructions(&name, &schema)),
            FormatMode::Tool | FormatMode::Strict => None,
        };
        Self {
            name,
            description: None,
            schema,
            mode,
            formatting_instructions,
        }
    }

    pub fn json<N: Into<String>>(name: N, schema: Value) -> Self {
        Self::new(name, schema, FormatMode::Json)
    }

    pub fn tool<N: Into<String>>(name: N, schema: Value) -> Self {
        Self::new(name, schema, FormatMode::Tool)
    }

    pub fn strict<N: Into<String>>(name: N, schema: Value) -> Self {
        Self::new(name, schema, FormatMode::Strict)
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the generated instructions. Empty instructions in `Json`
    /// mode fall back to the generated default rather than breaking the
    /// invariant.
    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        let instructions = instructions.into();
        self.formatting_instructions = if instructions.is_empty() {
            match self.mode {
                FormatMode::Json => Some(Self::default_instructions(&self.name, &self.schema)),
                _ => None,
            }
        } else {
            Some(instructions)
        };
        self
    }

    fn default_instructions(name: &str, schema: &Value) -> String {
        formatdoc! {r#"
            Respond with a single JSON value named '{name}' that conforms to
            the following JSON schema. Output only the JSON value, with no
            surrounding prose or code fences.

            {schema}"#,
            name = name,
            schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string()),
        }
    }

    /// The synthetic tool schema for `Tool` mode.
    pub fn output_tool_schema(&self) -> ToolSchema {
        ToolSchema {
            name: FORMATTED_OUTPUT_TOOL.to_string(),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| format!("Return the final '{}' output.", self.name)),
            parameters: self.schema.clone(),
            strict: true,
        }
    }

    /// The tool list actually sent to the provider: the caller's tools,
    /// plus the synthetic output tool in `Tool` mode.
    pub fn effective_tools(&self, tools: &[ToolSchema]) -> Vec<ToolSchema> {
        let mut effective = tools.to_vec();
        if self.mode == FormatMode::Tool {
            effective.push(self.output_tool_schema());
        }
        effective
    }

    /// System-message instructions, present only in `Json` mode.
    pub fn system_instructions(&self) -> Option<&str> {
        match self.mode {
            FormatMode::Json => self.formatting_instructions.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"value": {"type": "integer"}},
            "required": ["value"]
        })
    }

    #[test]
    fn test_tool_mode_synthesizes_exactly_one_extra_tool() {
        let format = Format::tool("answer", answer_schema());
        let base = vec![ToolSchema::new("search", "Search", json!({"type": "object"}))];
        let effective = format.effective_tools(&base);
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[1].name, FORMATTED_OUTPUT_TOOL);
        assert!(effective[1].strict);
        assert_eq!(format.system_instructions(), None);
    }

    #[test]
    fn test_json_mode_has_instructions_and_no_extra_tools() {
        let format = Format::json("answer", answer_schema());
        assert!(format
            .formatting_instructions
            .as_ref()
            .is_some_and(|i| !i.is_empty()));
        assert!(format.system_instructions().unwrap().contains("JSON schema"));
        assert_eq!(format.effective_tools(&[]).len(), 0);
    }

    #[test]
    fn test_empty_instruction_override_restores_default() {
        let format = Format::json("answer", answer_schema()).with_instructions("");
        assert!(format
            .formatting_instructions
            .as_ref()
            .is_some_and(|i| !i.is_empty()));
    }

    #[test]
    fn test_strict_mode_has_neither() {
        let format = Format::strict("answer", answer_schema());
        assert_eq!(format.formatting_instructions, None);
        assert_eq!(format.effective_tools(&[]).len(), 0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let format = Format::json("answer", answer_schema()).with_description("The answer");
        let serialized = serde_json::to_string(&format).unwrap();
        let back: Format = serde_json::from_str(&serialized).unwrap();
        assert_eq!(format, back);
    }
}
