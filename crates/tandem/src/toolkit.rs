use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::ToolError;
use crate::models::content::{Content, ToolCall, ToolOutput};
use crate::models::message::UserMessage;
use crate::models::tool::ToolSchema;
use crate::structured::validate_instance;

pub type SyncToolFn = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;
pub type AsyncToolFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;
pub type ContextToolFn<D> = Arc<dyn Fn(&D, Value) -> Result<Value, ToolError> + Send + Sync>;
pub type AsyncContextToolFn<D> =
    Arc<dyn for<'a> Fn(&'a D, Value) -> BoxFuture<'a, Result<Value, ToolError>> + Send + Sync>;

/// The closed set of invocation capabilities: {sync, async} x {plain,
/// context}. Context tools receive an injected dependency value as their
/// first argument; that value is never part of the model-visible
/// parameter schema.
enum ToolKind<D> {
    Sync(SyncToolFn),
    Async(AsyncToolFn),
    ContextSync(ContextToolFn<D>),
    ContextAsync(AsyncContextToolFn<D>),
}

/// One tool definition: a model-facing schema plus an invocation
/// capability. Context-bearing tools are made through the explicit
/// `context`/`context_async` constructors; there is no parameter-name or
/// position heuristic.
pub struct ToolDef<D = ()> {
    schema: ToolSchema,
    kind: ToolKind<D>,
}

impl<D> ToolDef<D> {
    pub fn sync<F>(schema: ToolSchema, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            schema,
            kind: ToolKind::Sync(Arc::new(f)),
        }
    }

    pub fn async_fn<F>(schema: ToolSchema, f: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync + 'static,
    {
        Self {
            schema,
            kind: ToolKind::Async(Arc::new(f)),
        }
    }

    pub fn context<F>(schema: ToolSchema, f: F) -> Self
    where
        F: Fn(&D, Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            schema,
            kind: ToolKind::ContextSync(Arc::new(f)),
        }
    }

    pub fn context_async<F>(schema: ToolSchema, f: F) -> Self
    where
        F: for<'a> Fn(&'a D, Value) -> BoxFuture<'a, Result<Value, ToolError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            schema,
            kind: ToolKind::ContextAsync(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, ToolKind::Async(_) | ToolKind::ContextAsync(_))
    }

    pub fn is_context(&self) -> bool {
        matches!(
            self.kind,
            ToolKind::ContextSync(_) | ToolKind::ContextAsync(_)
        )
    }

    /// Parse and schema-check the raw argument text of a call. Empty args
    /// normalize to `{}`.
    fn parse_args(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let args: Value = if call.args.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.args).map_err(|e| {
                ToolError::InvalidParameters(format!(
                    "could not parse arguments for '{}': {e}",
                    call.name
                ))
            })?
        };
        validate_instance(&self.schema.parameters, &args)
            .map_err(|e| ToolError::InvalidParameters(e.violations.join("; ")))?;
        Ok(args)
    }
}

impl<D> fmt::Debug for ToolDef<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.schema.name)
            .field("async", &self.is_async())
            .field("context", &self.is_context())
            .finish()
    }
}

/// An ordered, name-unique collection of tool definitions.
///
/// Generic over the context (deps) type `D`; a toolkit without context
/// tools uses the default `()`. The toolkit is read-only during dispatch.
#[derive(Debug)]
pub struct Toolkit<D = ()> {
    tools: Vec<ToolDef<D>>,
}

impl<D> Toolkit<D> {
    pub fn new(tools: Vec<ToolDef<D>>) -> Result<Self, ToolError> {
        let mut names = HashSet::new();
        for tool in &tools {
            if !names.insert(tool.name().to_string()) {
                return Err(ToolError::DuplicateName(tool.name().to_string()));
            }
        }
        Ok(Self { tools })
    }

    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDef<D>> {
        self.tools.iter()
    }

    /// Resolve a tool by name.
    pub fn get(&self, name: &str) -> Result<&ToolDef<D>, ToolError> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// The model-facing schemas, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|tool| tool.schema.clone()).collect()
    }

    /// Synchronous dispatch. Never returns an awaitable: resolving to an
    /// async tool fails with `ToolError::AsyncTool`.
    pub fn execute_with(&self, ctx: &D, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self.get(&call.name)?;
        let args = tool.parse_args(call)?;
        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        let value = match &tool.kind {
            ToolKind::Sync(f) => f(args)?,
            ToolKind::ContextSync(f) => f(ctx, args)?,
            ToolKind::Async(_) | ToolKind::ContextAsync(_) => {
                return Err(ToolError::AsyncTool(call.name.clone()))
            }
        };
        Ok(ToolOutput::new(call.id.clone(), call.name.clone(), value))
    }

    /// Asynchronous dispatch. Handles every variant; sync tools run
    /// inline before the returned future resolves.
    pub async fn execute_with_async(
        &self,
        ctx: &D,
        call: &ToolCall,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(&call.name)?;
        let args = tool.parse_args(call)?;
        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        let value = match &tool.kind {
            ToolKind::Sync(f) => f(args)?,
            ToolKind::ContextSync(f) => f(ctx, args)?,
            ToolKind::Async(f) => f(args).await?,
            ToolKind::ContextAsync(f) => f(ctx, args).await?,
        };
        Ok(ToolOutput::new(call.id.clone(), call.name.clone(), value))
    }

    /// Like `execute_with`, but a failure becomes a model-visible output
    /// whose value is the error text, so the conversation can continue.
    pub fn execute_with_or_report(&self, ctx: &D, call: &ToolCall) -> ToolOutput {
        match self.execute_with(ctx, call) {
            Ok(output) => output,
            Err(error) => ToolOutput::new(
                call.id.clone(),
                call.name.clone(),
                Value::String(error.to_string()),
            ),
        }
    }

    /// Async mirror of `execute_with_or_report`.
    pub async fn execute_with_or_report_async(&self, ctx: &D, call: &ToolCall) -> ToolOutput {
        match self.execute_with_async(ctx, call).await {
            Ok(output) => output,
            Err(error) => ToolOutput::new(
                call.id.clone(),
                call.name.clone(),
                Value::String(error.to_string()),
            ),
        }
    }
}

impl Toolkit<()> {
    pub fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        self.execute_with(&(), call)
    }

    pub async fn execute_async(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        self.execute_with_async(&(), call).await
    }

    pub fn execute_or_report(&self, call: &ToolCall) -> ToolOutput {
        self.execute_with_or_report(&(), call)
    }

    pub async fn execute_or_report_async(&self, call: &ToolCall) -> ToolOutput {
        self.execute_with_or_report_async(&(), call).await
    }
}

impl<D> Default for Toolkit<D> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Build the user message that feeds tool outputs back to the model.
///
/// Outputs are reinserted in the order of the originating calls, matched
/// by id; order-sensitive provider adapters depend on this. Every call
/// must have exactly one output and vice versa.
pub fn outputs_message(
    calls: &[&ToolCall],
    outputs: Vec<ToolOutput>,
) -> Result<UserMessage, ToolError> {
    let mut by_id: HashMap<String, ToolOutput> = HashMap::new();
    for output in outputs {
        let id = output.id.clone();
        if by_id.insert(id.clone(), output).is_some() {
            return Err(ToolError::Execution(format!(
                "duplicate output for tool call '{id}'"
            )));
        }
    }

    let mut content = Vec::with_capacity(calls.len());
    for call in calls {
        let output = by_id.remove(&call.id).ok_or_else(|| {
            ToolError::Execution(format!("no output for tool call '{}'", call.id))
        })?;
        content.push(Content::ToolOutput(output));
    }

    if let Some(id) = by_id.keys().next() {
        return Err(ToolError::Execution(format!(
            "output for unknown tool call '{id}'"
        )));
    }

    Ok(UserMessage::new(content))
}
