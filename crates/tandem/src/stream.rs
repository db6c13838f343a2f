use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::errors::StreamError;
use crate::models::content::{Content, ToolCall};
use crate::models::message::{AssistantMessage, RawMessage};
use crate::models::usage::Usage;
use crate::providers::base::CallRequest;
use crate::response::{FinishReason, Response};

/// One incremental event from a provider stream.
///
/// Each content part arrives as a start/delta/end triple; `Finish` and
/// `Usage` carry exchange-level metadata. The `type` tag is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResponseChunk {
    TextStart,
    TextDelta { delta: String },
    TextEnd,
    ThoughtStart,
    ThoughtDelta { delta: String },
    ThoughtEnd,
    ToolCallStart { id: String, name: String },
    ToolCallDelta { delta: String },
    ToolCallEnd,
    Finish { finish_reason: Option<FinishReason> },
    Usage { usage: Usage },
}

/// A chunk paired with the provider's raw native chunk, when the adapter
/// chooses to keep it.
pub type ChunkItem = (StreamResponseChunk, Option<Value>);

/// Synchronous one-shot chunk source supplied by a provider adapter.
pub type ChunkSource = Box<dyn Iterator<Item = Result<ChunkItem, StreamError>> + Send>;

/// Asynchronous one-shot chunk source supplied by a provider adapter.
pub type AsyncChunkSource = BoxStream<'static, Result<ChunkItem, StreamError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Streaming,
    Finished,
    Errored,
}

/// Context handed to the error-recording hook, once, on terminal failure.
#[derive(Debug, Clone)]
pub struct StreamErrorContext {
    pub provider_id: String,
    pub model_id: String,
    pub partial_text: String,
}

/// Error-recording hook for stream failures. Invoked exactly once per
/// terminal failure, before the error is returned to the caller.
pub trait StreamObserver: Send + Sync {
    fn on_stream_error(&self, error: &StreamError, context: &StreamErrorContext);
}

/// Which content part is currently mid-stream.
enum Building {
    None,
    /// Index of the text part in `content`; text is visible (and grows in
    /// place) while still streaming, so partial text survives
    /// abandonment.
    Text(usize),
    Thought(String),
    ToolCall { id: String, name: String, args: String },
}

/// Chunk accumulation shared by the sync and async stream mirrors.
///
/// Thought and tool-call parts are only added to `content` once their end
/// chunk arrives, so abandoned streams never expose partial tool calls.
struct Accumulator {
    chunks: Vec<StreamResponseChunk>,
    content: Vec<Content>,
    building: Building,
    finished: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    raw: Vec<Value>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            content: Vec::new(),
            building: Building::None,
            finished: false,
            finish_reason: None,
            usage: None,
            raw: Vec::new(),
        }
    }

    fn handle(&mut self, chunk: &StreamResponseChunk, raw: Option<Value>) -> Result<(), String> {
        if self.finished {
            return Err("received a chunk after the finish chunk".to_string());
        }
        match chunk {
            StreamResponseChunk::TextStart => {
                self.expect_idle("text_start")?;
                self.content.push(Content::text(""));
                self.building = Building::Text(self.content.len() - 1);
            }
            StreamResponseChunk::TextDelta { delta } => match self.building {
                Building::Text(index) => {
                    if let Content::Text(text) = &mut self.content[index] {
                        text.text.push_str(delta);
                    }
                }
                _ => return Err("received text_delta while not streaming text".to_string()),
            },
            StreamResponseChunk::TextEnd => match self.building {
                Building::Text(_) => self.building = Building::None,
                _ => return Err("received text_end while not streaming text".to_string()),
            },
            StreamResponseChunk::ThoughtStart => {
                self.expect_idle("thought_start")?;
                self.building = Building::Thought(String::new());
            }
            StreamResponseChunk::ThoughtDelta { delta } => match &mut self.building {
                Building::Thought(thought) => thought.push_str(delta),
                _ => return Err("received thought_delta while not streaming a thought".to_string()),
            },
            StreamResponseChunk::ThoughtEnd => {
                match std::mem::replace(&mut self.building, Building::None) {
                    Building::Thought(thought) => self.content.push(Content::thought(thought)),
                    building => {
                        self.building = building;
                        return Err(
                            "received thought_end while not streaming a thought".to_string()
                        );
                    }
                }
            }
            StreamResponseChunk::ToolCallStart { id, name } => {
                self.expect_idle("tool_call_start")?;
                self.building = Building::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: String::new(),
                };
            }
            StreamResponseChunk::ToolCallDelta { delta } => match &mut self.building {
                Building::ToolCall { args, .. } => args.push_str(delta),
                _ => {
                    return Err(
                        "received tool_call_delta while not streaming a tool call".to_string()
                    )
                }
            },
            StreamResponseChunk::ToolCallEnd => {
                match std::mem::replace(&mut self.building, Building::None) {
                    Building::ToolCall { id, name, mut args } => {
                        if args.is_empty() {
                            args = "{}".to_string();
                        }
                        self.content.push(Content::ToolCall(ToolCall::new(id, name, args)));
                    }
                    building => {
                        self.building = building;
                        return Err(
                            "received tool_call_end while not streaming a tool call".to_string()
                        );
                    }
                }
            }
            StreamResponseChunk::Finish { finish_reason } => {
                self.finished = true;
                self.finish_reason = *finish_reason;
            }
            StreamResponseChunk::Usage { usage } => {
                self.usage = Some(usage.clone());
            }
        }

        self.chunks.push(chunk.clone());
        if let Some(raw) = raw {
            self.raw.push(raw);
        }
        Ok(())
    }

    fn expect_idle(&self, kind: &str) -> Result<(), String> {
        match self.building {
            Building::None => Ok(()),
            _ => Err(format!("received {kind} while another part is streaming")),
        }
    }

    fn partial_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Everything but the source: identity, accumulated state, terminal
/// caches, and the observer. Shared by the sync and async mirrors.
struct StreamCore {
    provider_id: String,
    provider_model_name: String,
    request: CallRequest,
    acc: Accumulator,
    state: StreamState,
    response: Option<Response>,
    error: Option<StreamError>,
    observer: Option<Box<dyn StreamObserver>>,
}

impl StreamCore {
    fn new(provider_id: String, provider_model_name: String, request: CallRequest) -> Self {
        Self {
            provider_id,
            provider_model_name,
            request,
            acc: Accumulator::new(),
            state: StreamState::NotStarted,
            response: None,
            error: None,
            observer: None,
        }
    }

    fn begin(&mut self) {
        if self.state == StreamState::NotStarted {
            self.state = StreamState::Streaming;
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, StreamState::Finished | StreamState::Errored)
    }

    /// Feed one pulled item through the machine. `None` means the source
    /// is exhausted.
    fn ingest(
        &mut self,
        item: Option<Result<ChunkItem, StreamError>>,
    ) -> Option<Result<StreamResponseChunk, StreamError>> {
        match item {
            None => {
                self.complete();
                None
            }
            Some(Ok((chunk, raw))) => match self.acc.handle(&chunk, raw) {
                Ok(()) => Some(Ok(chunk)),
                Err(message) => {
                    let error = StreamError::new(
                        self.provider_id.clone(),
                        self.request.model_id.clone(),
                        message,
                    );
                    Some(Err(self.fail(error)))
                }
            },
            Some(Err(error)) => Some(Err(self.fail(error))),
        }
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        if self.state != StreamState::Errored {
            self.state = StreamState::Errored;
            self.error = Some(error.clone());
            let context = StreamErrorContext {
                provider_id: self.provider_id.clone(),
                model_id: self.request.model_id.clone(),
                partial_text: self.acc.partial_text(),
            };
            error!(
                provider = %context.provider_id,
                model = %context.model_id,
                "stream failed: {}",
                error
            );
            if let Some(observer) = &self.observer {
                observer.on_stream_error(&error, &context);
            }
        }
        error
    }

    fn complete(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = StreamState::Finished;

        let raw_message = if self.acc.raw.is_empty() {
            None
        } else {
            Some(RawMessage::json(Value::Array(self.acc.raw.clone())))
        };
        let mut assistant = AssistantMessage::new(self.acc.content.clone()).with_provenance(
            self.provider_id.clone(),
            self.request.model_id.clone(),
            self.provider_model_name.clone(),
        );
        assistant.raw_message = raw_message;

        self.response = Some(Response {
            provider_id: self.provider_id.clone(),
            model_id: self.request.model_id.clone(),
            provider_model_name: self.provider_model_name.clone(),
            params: self.request.params.clone(),
            tools: self.request.tools.clone(),
            format: self.request.format.clone(),
            input_messages: self.request.messages.clone(),
            assistant_message: assistant,
            finish_reason: self.acc.finish_reason,
            usage: self.acc.usage.clone(),
        });
    }

    fn close(&mut self) {
        if self.is_terminal() {
            return;
        }
        // Caller-initiated: the observer hook is for source failures only.
        self.state = StreamState::Errored;
        self.error = Some(StreamError::new(
            self.provider_id.clone(),
            self.request.model_id.clone(),
            "stream closed before completion",
        ));
    }
}

/// The synchronous pull state machine over a provider chunk stream.
///
/// Single-owner and mutable until it reaches a terminal state. Chunks are
/// cached as they are consumed, so `chunk_stream()` can be called again:
/// a fresh iterator replays the cached chunks, then continues pulling the
/// live source. `finish()` drains the source and is idempotent on
/// success; after a failure it returns the cached error verbatim.
pub struct StreamResponse {
    core: StreamCore,
    source: Option<ChunkSource>,
}

impl StreamResponse {
    pub fn new<P, N>(
        provider_id: P,
        provider_model_name: N,
        request: CallRequest,
        source: ChunkSource,
    ) -> Self
    where
        P: Into<String>,
        N: Into<String>,
    {
        Self {
            core: StreamCore::new(provider_id.into(), provider_model_name.into(), request),
            source: Some(source),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn StreamObserver>) -> Self {
        self.core.observer = Some(observer);
        self
    }

    pub fn state(&self) -> StreamState {
        self.core.state
    }

    /// The chunks consumed so far.
    pub fn chunks(&self) -> &[StreamResponseChunk] {
        &self.core.acc.chunks
    }

    /// The content accumulated so far. Text parts appear (and grow) while
    /// still streaming; thoughts and tool calls appear once complete.
    pub fn content(&self) -> &[Content] {
        &self.core.acc.content
    }

    pub fn partial_text(&self) -> String {
        self.core.acc.partial_text()
    }

    /// Pull-based chunk iterator: replays cached chunks, then consumes
    /// the live source.
    pub fn chunk_stream(&mut self) -> ChunkStream<'_> {
        ChunkStream {
            stream: self,
            replay: 0,
            delivered_error: false,
        }
    }

    /// Text deltas only; fully consuming it consumes the whole stream.
    pub fn pretty_stream(&mut self) -> impl Iterator<Item = Result<String, StreamError>> + '_ {
        self.chunk_stream().filter_map(|item| match item {
            Ok(StreamResponseChunk::TextDelta { delta }) => Some(Ok(delta)),
            Ok(_) => None,
            Err(error) => Some(Err(error)),
        })
    }

    /// Drain the source and return the accumulated `Response`.
    ///
    /// Idempotent on success: later calls return the cached response
    /// without re-reading the source. After a failure, every call returns
    /// the same cached error.
    pub fn finish(&mut self) -> Result<Response, StreamError> {
        loop {
            match self.core.state {
                StreamState::Finished => {
                    return Ok(self.core.response.clone().expect("finished stream has response"))
                }
                StreamState::Errored => {
                    return Err(self.core.error.clone().expect("errored stream has error"))
                }
                _ => {
                    if let Some(Err(error)) = self.advance() {
                        return Err(error);
                    }
                }
            }
        }
    }

    /// Abandon an unfinished stream. Terminal states are left untouched;
    /// an unfinished stream becomes `Errored` with a "closed" error.
    pub fn close(&mut self) {
        self.core.close();
        self.source = None;
    }

    fn advance(&mut self) -> Option<Result<StreamResponseChunk, StreamError>> {
        self.core.begin();
        let item = match self.source.as_mut() {
            Some(source) => source.next(),
            None => None,
        };
        let out = self.core.ingest(item);
        if self.core.is_terminal() {
            self.source = None;
        }
        out
    }
}

/// Borrowing iterator over a [`StreamResponse`]'s chunks.
pub struct ChunkStream<'a> {
    stream: &'a mut StreamResponse,
    replay: usize,
    delivered_error: bool,
}

impl Iterator for ChunkStream<'_> {
    type Item = Result<StreamResponseChunk, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.replay < self.stream.core.acc.chunks.len() {
            let chunk = self.stream.core.acc.chunks[self.replay].clone();
            self.replay += 1;
            return Some(Ok(chunk));
        }
        match self.stream.core.state {
            StreamState::Finished => None,
            StreamState::Errored => {
                if self.delivered_error {
                    None
                } else {
                    self.delivered_error = true;
                    Some(Err(self
                        .stream
                        .core
                        .error
                        .clone()
                        .expect("errored stream has error")))
                }
            }
            _ => match self.stream.advance() {
                Some(Ok(chunk)) => {
                    self.replay += 1;
                    Some(Ok(chunk))
                }
                Some(Err(error)) => {
                    self.delivered_error = true;
                    Some(Err(error))
                }
                None => None,
            },
        }
    }
}

/// Asynchronous mirror of [`StreamResponse`]: same state machine, same
/// caching and idempotence, awaiting the source instead of blocking on
/// it.
pub struct AsyncStreamResponse {
    core: StreamCore,
    source: Option<AsyncChunkSource>,
}

impl AsyncStreamResponse {
    pub fn new<P, N>(
        provider_id: P,
        provider_model_name: N,
        request: CallRequest,
        source: AsyncChunkSource,
    ) -> Self
    where
        P: Into<String>,
        N: Into<String>,
    {
        Self {
            core: StreamCore::new(provider_id.into(), provider_model_name.into(), request),
            source: Some(source),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn StreamObserver>) -> Self {
        self.core.observer = Some(observer);
        self
    }

    pub fn state(&self) -> StreamState {
        self.core.state
    }

    pub fn chunks(&self) -> &[StreamResponseChunk] {
        &self.core.acc.chunks
    }

    pub fn content(&self) -> &[Content] {
        &self.core.acc.content
    }

    pub fn partial_text(&self) -> String {
        self.core.acc.partial_text()
    }

    /// Pull-based chunk stream: replays cached chunks, then consumes the
    /// live source.
    pub fn chunk_stream(
        &mut self,
    ) -> impl futures::Stream<Item = Result<StreamResponseChunk, StreamError>> + Send + '_ {
        async_stream::stream! {
            let mut replay = 0;
            loop {
                if replay < self.core.acc.chunks.len() {
                    let chunk = self.core.acc.chunks[replay].clone();
                    replay += 1;
                    yield Ok(chunk);
                    continue;
                }
                match self.core.state {
                    StreamState::Finished => break,
                    StreamState::Errored => {
                        yield Err(self.core.error.clone().expect("errored stream has error"));
                        break;
                    }
                    _ => match self.advance().await {
                        Some(Ok(chunk)) => {
                            replay += 1;
                            yield Ok(chunk);
                        }
                        Some(Err(error)) => {
                            yield Err(error);
                            break;
                        }
                        None => {}
                    },
                }
            }
        }
    }

    /// Async mirror of [`StreamResponse::pretty_stream`].
    pub fn pretty_stream(
        &mut self,
    ) -> impl futures::Stream<Item = Result<String, StreamError>> + Send + '_ {
        self.chunk_stream().filter_map(|item| {
            futures::future::ready(match item {
                Ok(StreamResponseChunk::TextDelta { delta }) => Some(Ok(delta)),
                Ok(_) => None,
                Err(error) => Some(Err(error)),
            })
        })
    }

    /// Async mirror of [`StreamResponse::finish`].
    pub async fn finish(&mut self) -> Result<Response, StreamError> {
        loop {
            match self.core.state {
                StreamState::Finished => {
                    return Ok(self.core.response.clone().expect("finished stream has response"))
                }
                StreamState::Errored => {
                    return Err(self.core.error.clone().expect("errored stream has error"))
                }
                _ => {
                    if let Some(Err(error)) = self.advance().await {
                        return Err(error);
                    }
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.core.close();
        self.source = None;
    }

    async fn advance(&mut self) -> Option<Result<StreamResponseChunk, StreamError>> {
        self.core.begin();
        let item = match self.source.as_mut() {
            Some(source) => source.next().await,
            None => None,
        };
        let out = self.core.ingest(item);
        if self.core.is_terminal() {
            self.source = None;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn request() -> CallRequest {
        CallRequest::new("acme:fast-1", vec![Message::user("hi")])
    }

    fn text_and_tool_chunks() -> Vec<Result<ChunkItem, StreamError>> {
        vec![
            Ok((StreamResponseChunk::TextStart, None)),
            Ok((
                StreamResponseChunk::TextDelta {
                    delta: "Hello ".to_string(),
                },
                None,
            )),
            Ok((
                StreamResponseChunk::TextDelta {
                    delta: "world".to_string(),
                },
                None,
            )),
            Ok((StreamResponseChunk::TextEnd, None)),
            Ok((
                StreamResponseChunk::ToolCallStart {
                    id: "c1".to_string(),
                    name: "search".to_string(),
                },
                None,
            )),
            Ok((
                StreamResponseChunk::ToolCallDelta {
                    delta: "{\"query\":".to_string(),
                },
                None,
            )),
            Ok((
                StreamResponseChunk::ToolCallDelta {
                    delta: "\"rust\"}".to_string(),
                },
                None,
            )),
            Ok((StreamResponseChunk::ToolCallEnd, None)),
            Ok((
                StreamResponseChunk::Finish {
                    finish_reason: None,
                },
                None,
            )),
        ]
    }

    fn counted_source(
        items: Vec<Result<ChunkItem, StreamError>>,
    ) -> (ChunkSource, Arc<AtomicUsize>) {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let source = items.into_iter().inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (Box::new(source), pulls)
    }

    #[test]
    fn test_accumulates_text_and_tool_calls() {
        let (source, _) = counted_source(text_and_tool_chunks());
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        assert_eq!(stream.state(), StreamState::NotStarted);

        let response = stream.finish().unwrap();
        assert_eq!(stream.state(), StreamState::Finished);
        assert_eq!(response.text(), "Hello world");
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].args, "{\"query\":\"rust\"}");
        assert_eq!(response.finish_reason, None);
        assert_eq!(response.provider_id, "acme");
    }

    #[test]
    fn test_finish_is_idempotent_and_does_not_reread_source() {
        let items = text_and_tool_chunks();
        let total = items.len();
        let (source, pulls) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);

        let first = stream.finish().unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), total);

        let second = stream.finish().unwrap();
        assert_eq!(first, second);
        // Source not touched again.
        assert_eq!(pulls.load(Ordering::SeqCst), total);
    }

    #[test]
    fn test_chunk_stream_replays_then_continues() {
        let (source, _) = counted_source(text_and_tool_chunks());
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);

        let first_pass: Vec<_> = stream.chunk_stream().take(2).collect();
        assert_eq!(first_pass.len(), 2);
        assert_eq!(stream.state(), StreamState::Streaming);
        assert_eq!(stream.partial_text(), "Hello ");

        // A fresh iterator replays the two cached chunks, then drains.
        let second_pass: Vec<_> = stream.chunk_stream().map(Result::unwrap).collect();
        assert_eq!(second_pass.len(), 9);
        assert_eq!(second_pass[0], StreamResponseChunk::TextStart);
        assert_eq!(stream.state(), StreamState::Finished);
    }

    #[test]
    fn test_source_error_is_cached_and_observed_once() {
        struct Recorder(Arc<Mutex<Vec<(String, String)>>>);
        impl StreamObserver for Recorder {
            fn on_stream_error(&self, error: &StreamError, context: &StreamErrorContext) {
                self.0
                    .lock()
                    .unwrap()
                    .push((error.message.clone(), context.partial_text.clone()));
            }
        }

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let items = vec![
            Ok((StreamResponseChunk::TextStart, None)),
            Ok((
                StreamResponseChunk::TextDelta {
                    delta: "par".to_string(),
                },
                None,
            )),
            Err(StreamError::new("acme", "acme:fast-1", "connection reset")),
        ];
        let (source, _) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source)
            .with_observer(Box::new(Recorder(recorded.clone())));

        let first = stream.finish().unwrap_err();
        assert_eq!(first.message, "connection reset");
        assert_eq!(stream.state(), StreamState::Errored);

        // Re-raised verbatim, observer not re-invoked.
        let second = stream.finish().unwrap_err();
        assert_eq!(first, second);
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "connection reset");
        assert_eq!(recorded[0].1, "par");
    }

    #[test]
    fn test_out_of_order_chunks_error_the_stream() {
        let items = vec![Ok((
            StreamResponseChunk::TextDelta {
                delta: "orphan".to_string(),
            },
            None,
        ))];
        let (source, _) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        let error = stream.finish().unwrap_err();
        assert!(error.message.contains("text_delta"));
        assert_eq!(stream.state(), StreamState::Errored);
    }

    #[test]
    fn test_incomplete_parts_stay_out_of_content() {
        let items = vec![
            Ok((StreamResponseChunk::ThoughtStart, None)),
            Ok((
                StreamResponseChunk::ThoughtDelta {
                    delta: "half a tho".to_string(),
                },
                None,
            )),
        ];
        let (source, _) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);

        let consumed: Vec<_> = stream.chunk_stream().take(2).collect();
        assert_eq!(consumed.len(), 2);
        // The unfinished thought is not in content.
        assert!(stream.content().is_empty());
    }

    #[test]
    fn test_empty_tool_args_normalize_to_object() {
        let items = vec![
            Ok((
                StreamResponseChunk::ToolCallStart {
                    id: "c1".to_string(),
                    name: "ping".to_string(),
                },
                None,
            )),
            Ok((StreamResponseChunk::ToolCallEnd, None)),
        ];
        let (source, _) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        let response = stream.finish().unwrap();
        assert_eq!(response.tool_calls()[0].args, "{}");
    }

    #[test]
    fn test_close_makes_finish_fail() {
        let (source, pulls) = counted_source(text_and_tool_chunks());
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        let _: Vec<_> = stream.chunk_stream().take(2).collect();

        stream.close();
        assert_eq!(stream.state(), StreamState::Errored);
        let error = stream.finish().unwrap_err();
        assert!(error.message.contains("closed"));
        // Closing released the source.
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pretty_stream_yields_text_deltas_only() {
        let (source, _) = counted_source(text_and_tool_chunks());
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        let deltas: Vec<String> = stream.pretty_stream().map(Result::unwrap).collect();
        assert_eq!(deltas, vec!["Hello ", "world"]);
        // Consuming the pretty stream consumed the whole source.
        assert_eq!(stream.state(), StreamState::Finished);
    }

    #[test]
    fn test_raw_chunks_become_raw_message() {
        let items = vec![
            Ok((
                StreamResponseChunk::TextStart,
                Some(serde_json::json!({"event": "start"})),
            )),
            Ok((
                StreamResponseChunk::TextDelta {
                    delta: "x".to_string(),
                },
                Some(serde_json::json!({"event": "delta"})),
            )),
            Ok((StreamResponseChunk::TextEnd, None)),
        ];
        let (source, _) = counted_source(items);
        let mut stream = StreamResponse::new("acme", "fast-1", request(), source);
        let response = stream.finish().unwrap();
        let raw = response.assistant_message.raw_message.unwrap();
        let array = raw.as_json().unwrap().as_array().unwrap();
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn test_chunk_serde_tags() {
        let chunk = StreamResponseChunk::ToolCallStart {
            id: "c1".to_string(),
            name: "search".to_string(),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "tool_call_start");
        let back: StreamResponseChunk = serde_json::from_value(value).unwrap();
        assert_eq!(chunk, back);
    }

    #[tokio::test]
    async fn test_async_mirror_accumulates_and_is_idempotent() {
        let items = text_and_tool_chunks();
        let source: AsyncChunkSource = Box::pin(tokio_stream::iter(items));
        let mut stream = AsyncStreamResponse::new("acme", "fast-1", request(), source);

        let first = stream.finish().await.unwrap();
        assert_eq!(first.text(), "Hello world");
        let second = stream.finish().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_async_chunk_stream_replays() {
        let items = text_and_tool_chunks();
        let source: AsyncChunkSource = Box::pin(tokio_stream::iter(items));
        let mut stream = AsyncStreamResponse::new("acme", "fast-1", request(), source);

        {
            let chunks = stream.chunk_stream();
            futures::pin_mut!(chunks);
            let first = chunks.next().await.unwrap().unwrap();
            assert_eq!(first, StreamResponseChunk::TextStart);
        }
        assert_eq!(stream.state(), StreamState::Streaming);

        {
            let chunks = stream.chunk_stream();
            futures::pin_mut!(chunks);
            let mut count = 0;
            while let Some(item) = chunks.next().await {
                item.unwrap();
                count += 1;
            }
            assert_eq!(count, 9);
        }
        assert_eq!(stream.state(), StreamState::Finished);
    }

    #[tokio::test]
    async fn test_async_error_cached() {
        let items: Vec<Result<ChunkItem, StreamError>> = vec![Err(StreamError::new(
            "acme",
            "acme:fast-1",
            "boom",
        ))];
        let source: AsyncChunkSource = Box::pin(tokio_stream::iter(items));
        let mut stream = AsyncStreamResponse::new("acme", "fast-1", request(), source);

        let first = stream.finish().await.unwrap_err();
        let second = stream.finish().await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(stream.state(), StreamState::Errored);
    }
}
