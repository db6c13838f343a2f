use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::errors::{LlmError, LlmResult};
use crate::models::content::{Content, ToolCall};
use crate::models::format::{Format, FORMATTED_OUTPUT_TOOL};
use crate::models::message::Message;
use crate::models::tool::ToolSchema;
use crate::providers::base::{CallRequest, Provider, ProviderReply};
use crate::providers::registry::Registry;
use crate::response::{Params, Response};
use crate::stream::AsyncStreamResponse;
use crate::structured::CorrectionLoop;
use crate::toolkit::{outputs_message, Toolkit};

/// One provider-bound model plus default request parameters: the
/// call-construction component. Applies the format mode, drives the tool
/// loop and the validation-retry loop, and wraps provider replies into
/// canonical responses.
#[derive(Clone)]
pub struct Model {
    provider: Arc<dyn Provider>,
    model_id: String,
    params: Option<Params>,
}

impl Model {
    pub fn new<M: Into<String>>(provider: Arc<dyn Provider>, model_id: M) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            params: None,
        }
    }

    /// Resolve a `provider:model` scoped id against a registry.
    pub fn from_registry(registry: &Registry, model_id: &str) -> LlmResult<Self> {
        let (provider, model_id) = registry.resolve(model_id)?;
        Ok(Self::new(provider, model_id))
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Normalize one logical request: apply the format's mode (synthetic
    /// output tool, or instructions merged into a system message) and
    /// attach default params.
    fn build_request(
        &self,
        mut messages: Vec<Message>,
        tools: &[ToolSchema],
        format: Option<&Format>,
    ) -> CallRequest {
        let effective_tools = match format {
            Some(format) => {
                if let Some(instructions) = format.system_instructions() {
                    merge_system_instructions(&mut messages, instructions);
                }
                format.effective_tools(tools)
            }
            None => tools.to_vec(),
        };

        let mut request = CallRequest::new(self.model_id.clone(), messages)
            .with_tools(effective_tools);
        if let Some(format) = format {
            request = request.with_format(format.clone());
        }
        if let Some(params) = &self.params {
            request = request.with_params(params.clone());
        }
        request
    }

    /// One model turn.
    pub async fn respond(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        format: Option<&Format>,
    ) -> LlmResult<Response> {
        let request = self.build_request(messages, tools, format);
        self.respond_to_request(request).await
    }

    /// One model turn from an already-built request (e.g. a `resume`
    /// continuation).
    pub async fn respond_to_request(&self, request: CallRequest) -> LlmResult<Response> {
        debug!(model = %request.model_id, messages = request.messages.len(), "issuing call");
        let reply = self.provider.complete(&request).await?;
        Ok(self.wrap(request, reply))
    }

    /// One streaming model turn. The returned stream owns the
    /// accumulation; the caller drives it.
    pub async fn stream(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        format: Option<&Format>,
    ) -> LlmResult<AsyncStreamResponse> {
        let request = self.build_request(messages, tools, format);
        let source = self.provider.stream(&request).await?;
        Ok(AsyncStreamResponse::new(
            self.provider.id(),
            self.provider.provider_model_name(&request.model_id),
            request,
            source,
        ))
    }

    /// Append user content to a finished exchange and run one more turn.
    pub async fn resume(&self, response: &Response, content: Vec<Content>) -> LlmResult<Response> {
        self.respond_to_request(response.resume(content)).await
    }

    /// The tool-calling conversation loop: call the model, dispatch every
    /// requested tool call, reinsert the outputs in call order, and
    /// repeat until the model stops calling tools.
    ///
    /// Tool failures are reported back to the model as outputs rather
    /// than aborting the loop. Sync and async tools mix freely; dispatch
    /// awaits only where a tool actually is async.
    pub async fn run_tools<D: Sync>(
        &self,
        messages: Vec<Message>,
        toolkit: &Toolkit<D>,
        ctx: &D,
        format: Option<&Format>,
    ) -> LlmResult<Response> {
        let schemas = toolkit.schemas();
        let mut response = self.respond(messages, &schemas, format).await?;

        loop {
            let calls: Vec<ToolCall> = response
                .tool_calls()
                .into_iter()
                .filter(|call| call.name != FORMATTED_OUTPUT_TOOL)
                .cloned()
                .collect();
            if calls.is_empty() {
                return Ok(response);
            }

            let outputs = join_all(
                calls
                    .iter()
                    .map(|call| toolkit.execute_with_or_report_async(ctx, call)),
            )
            .await;

            let call_refs: Vec<&ToolCall> = calls.iter().collect();
            let user_message = outputs_message(&call_refs, outputs).map_err(LlmError::Tool)?;
            response = self
                .respond_to_request(response.resume(user_message.content))
                .await?;
        }
    }

    /// The validation-retry loop. `attempts` is the caller's total model
    /// turn budget (the backoff between turns, if any, is also the
    /// caller's concern). Each failed turn's errors are reinserted as a
    /// single correction message; when the budget is exhausted the
    /// accumulated errors surface as one `ValidationError`.
    pub async fn respond_formatted(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        format: &Format,
        attempts: usize,
    ) -> LlmResult<Response> {
        let mut rounds = CorrectionLoop::new();
        let mut response = self.respond(messages, tools, Some(format)).await?;
        let mut turn = 1;

        loop {
            match response.parse() {
                Ok(_) => return Ok(response),
                Err(LlmError::Validation(error)) => {
                    let correction = rounds.record(error);
                    if turn >= attempts {
                        return Err(LlmError::Validation(rounds.into_error()));
                    }
                    debug!(turn, "format validation failed, reinserting errors");
                    response = self
                        .respond_to_request(response.resume(correction.content))
                        .await?;
                    turn += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn wrap(&self, request: CallRequest, reply: ProviderReply) -> Response {
        Response {
            provider_id: self.provider.id().to_string(),
            model_id: request.model_id.clone(),
            provider_model_name: self.provider.provider_model_name(&request.model_id),
            params: request.params.clone(),
            tools: request.tools.clone(),
            format: request.format.clone(),
            input_messages: request.messages,
            assistant_message: reply.assistant_message,
            finish_reason: reply.finish_reason,
            usage: reply.usage,
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("provider", &self.provider.id())
            .field("model_id", &self.model_id)
            .field("params", &self.params)
            .finish()
    }
}

/// Merge format instructions into the leading system message, or insert
/// one if the conversation has none.
fn merge_system_instructions(messages: &mut Vec<Message>, instructions: &str) {
    if let Some(Message::System(system)) = messages.first_mut() {
        let merged = format!("{}\n\n{}", system.text(), instructions);
        system.content = Content::text(merged);
        return;
    }
    messages.insert(0, Message::system(instructions));
}
