use indoc::formatdoc;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::errors::ValidationError;
use crate::models::format::{Format, FormatMode, FORMATTED_OUTPUT_TOOL};
use crate::models::message::{AssistantMessage, UserMessage};

/// Validate a JSON instance against a Draft 7 schema, collecting every
/// violation with its instance path.
pub fn validate_instance(schema: &Value, instance: &Value) -> Result<(), ValidationError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| ValidationError::single(format!("invalid schema: {e}")))?;

    if let Err(errors) = compiled.validate(instance) {
        let violations: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        return Err(ValidationError::new(violations));
    }
    Ok(())
}

/// Extract and validate the structured output of an assistant message
/// according to the format's mode.
///
/// `Tool` mode reads the synthetic output tool call's arguments; `Json`
/// and `Strict` modes read the concatenated text. The returned value is
/// the validated schema instance.
pub fn parse_output(format: &Format, message: &AssistantMessage) -> Result<Value, ValidationError> {
    let candidate = match format.mode {
        FormatMode::Tool => {
            let call = message
                .tool_calls()
                .into_iter()
                .find(|call| call.name == FORMATTED_OUTPUT_TOOL)
                .ok_or_else(|| {
                    ValidationError::single(format!(
                        "response contains no '{FORMATTED_OUTPUT_TOOL}' tool call"
                    ))
                })?;
            serde_json::from_str(&call.args).map_err(|e| {
                ValidationError::single(format!("output tool arguments are not valid JSON: {e}"))
            })?
        }
        FormatMode::Json | FormatMode::Strict => {
            let text = message.text_joined();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::single("response contains no text"));
            }
            serde_json::from_str(trimmed).map_err(|e| {
                ValidationError::single(format!("response text is not valid JSON: {e}"))
            })?
        }
    };

    validate_instance(&format.schema, &candidate)?;
    Ok(candidate)
}

/// Accumulated state of a validation-retry conversation.
///
/// Each failed round is recorded and turned into a single correction
/// message for the next turn; no prior error context is ever dropped.
/// The attempt budget lives with the caller — this type only guarantees
/// the loop can be driven through any number of rounds.
#[derive(Debug, Default)]
pub struct CorrectionLoop {
    errors: Vec<ValidationError>,
}

impl CorrectionLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed round and build the user message that asks the
    /// model to correct itself, summarizing every error so far.
    pub fn record(&mut self, error: ValidationError) -> UserMessage {
        self.errors.push(error);
        UserMessage::text(self.correction_text())
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn rounds(&self) -> usize {
        self.errors.len()
    }

    /// Collapse the accumulated rounds into one error, for surfacing once
    /// the caller's attempt budget is exhausted.
    pub fn into_error(self) -> ValidationError {
        let violations = self
            .errors
            .into_iter()
            .enumerate()
            .flat_map(|(round, error)| {
                error
                    .violations
                    .into_iter()
                    .map(move |violation| format!("attempt {}: {violation}", round + 1))
            })
            .collect();
        ValidationError::new(violations)
    }

    fn correction_text(&self) -> String {
        let listed: Vec<String> = self
            .errors
            .iter()
            .enumerate()
            .flat_map(|(round, error)| {
                error
                    .violations
                    .iter()
                    .map(move |violation| format!("- attempt {}: {violation}", round + 1))
            })
            .collect();
        formatdoc! {"
            The previous response did not match the required output format.
            Validation errors so far:
            {errors}

            Respond again, correcting these errors. Produce only the
            requested output.",
            errors = listed.join("\n"),
        }
    }
}
