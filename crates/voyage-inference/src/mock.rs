//! Scripted in-process gateway for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{CompletionRequest, GatewayError, InferenceGateway, TextStream};

/// One scripted answer.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Plain text answer for `complete`, or a single chunk for `stream`.
    Text(String),
    /// JSON answer for `generate_structured`.
    Json(Value),
    /// Chunks delivered by `stream`.
    Chunks(Vec<String>),
    /// Chunks delivered by `stream`, followed by a timeout.
    ChunksThenTimeout(Vec<String>),
    /// The call times out.
    Timeout,
    /// The model answered with unparsable output.
    Malformed(String),
    /// The service answered with an error status.
    Status(u16, String),
    /// The call never completes.
    Hang,
}

/// Which trait method a recorded call went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Complete,
    Structured,
    Stream,
}

/// A call observed by [`ScriptedGateway`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub request: CompletionRequest,
    pub schema: Option<Value>,
}

/// What to do once a method's script runs out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Exhausted {
    /// Fail with [`GatewayError::InvalidResponse`].
    #[default]
    Fail,
    /// Echo the last user message as text and answer `{}` to structured
    /// requests. Used by `voyage serve --offline`.
    Echo,
}

const SCRIPTED_TIMEOUT: Duration = Duration::from_secs(60);

/// Gateway that replays queued [`Reply`]s per method and records every call.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    complete: Mutex<VecDeque<Reply>>,
    structured: Mutex<VecDeque<Reply>>,
    stream: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
    exhausted: Exhausted,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that never runs out of answers.
    pub fn offline() -> Self {
        Self {
            exhausted: Exhausted::Echo,
            ..Self::default()
        }
    }

    pub fn on_complete(self, reply: Reply) -> Self {
        push(&self.complete, reply);
        self
    }

    pub fn on_structured(self, reply: Reply) -> Self {
        push(&self.structured, reply);
        self
    }

    pub fn on_stream(self, reply: Reply) -> Self {
        push(&self.stream, reply);
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls of one kind.
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    fn next(&self, kind: CallKind, request: &CompletionRequest, schema: Option<&Value>) -> Option<Reply> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                request: request.clone(),
                schema: schema.cloned(),
            });
        }
        let queue = match kind {
            CallKind::Complete => &self.complete,
            CallKind::Structured => &self.structured,
            CallKind::Stream => &self.stream,
        };
        let reply = queue.lock().ok().and_then(|mut q| q.pop_front());
        debug!(?kind, scripted = reply.is_some(), "ScriptedGateway call");
        reply
    }

    fn exhausted_error(kind: CallKind) -> GatewayError {
        GatewayError::InvalidResponse(format!("No scripted reply left for {kind:?}"))
    }

    fn echo(request: &CompletionRequest) -> String {
        request.last_user_message().unwrap_or_default().to_string()
    }
}

fn push(queue: &Mutex<VecDeque<Reply>>, reply: Reply) {
    if let Ok(mut q) = queue.lock() {
        q.push_back(reply);
    }
}

async fn fail(reply: Reply) -> GatewayError {
    match reply {
        Reply::Timeout | Reply::ChunksThenTimeout(_) => GatewayError::Timeout(SCRIPTED_TIMEOUT),
        Reply::Malformed(raw) => GatewayError::MalformedOutput(raw),
        Reply::Status(status, message) => GatewayError::Api { status, message },
        Reply::Hang => futures::future::pending().await,
        other => GatewayError::InvalidResponse(format!("Reply {other:?} does not fit this call")),
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        match self.next(CallKind::Complete, &request, None) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Json(value)) => Ok(value.to_string()),
            Some(other) => Err(fail(other).await),
            None => match self.exhausted {
                Exhausted::Echo => Ok(Self::echo(&request)),
                Exhausted::Fail => Err(Self::exhausted_error(CallKind::Complete)),
            },
        }
    }

    async fn generate_structured(
        &self,
        request: CompletionRequest,
        schema: &Value,
    ) -> Result<Value, GatewayError> {
        match self.next(CallKind::Structured, &request, Some(schema)) {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Text(text)) => crate::gateway::parse_json_output(&text),
            Some(other) => Err(fail(other).await),
            None => match self.exhausted {
                Exhausted::Echo => Ok(json!({})),
                Exhausted::Fail => Err(Self::exhausted_error(CallKind::Structured)),
            },
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, GatewayError> {
        let chunks: Vec<Result<String, GatewayError>> =
            match self.next(CallKind::Stream, &request, None) {
                Some(Reply::Text(text)) => vec![Ok(text)],
                Some(Reply::Chunks(chunks)) => chunks.into_iter().map(Ok).collect(),
                Some(Reply::ChunksThenTimeout(chunks)) => chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(GatewayError::Timeout(SCRIPTED_TIMEOUT))))
                    .collect(),
                Some(Reply::Hang) => {
                    return Ok(futures::stream::pending().boxed());
                }
                Some(other) => return Err(fail(other).await),
                None => match self.exhausted {
                    Exhausted::Echo => vec![Ok(Self::echo(&request))],
                    Exhausted::Fail => return Err(Self::exhausted_error(CallKind::Stream)),
                },
            };
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new("system").with_user(text)
    }

    #[tokio::test]
    async fn test_replies_in_order_and_records_calls() {
        let gw = ScriptedGateway::new()
            .on_complete(Reply::Text("one".into()))
            .on_complete(Reply::Text("two".into()));

        assert_eq!(gw.complete(request("a")).await.unwrap(), "one");
        assert_eq!(gw.complete(request("b")).await.unwrap(), "two");
        assert!(gw.complete(request("c")).await.is_err());

        let calls = gw.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].request.last_user_message(), Some("b"));
        assert_eq!(gw.count(CallKind::Complete), 3);
    }

    #[tokio::test]
    async fn test_structured_replies() {
        let schema = json!({"type": "object"});
        let gw = ScriptedGateway::new()
            .on_structured(Reply::Json(json!({"a": 1})))
            .on_structured(Reply::Malformed("oops".into()))
            .on_structured(Reply::Timeout);

        assert_eq!(
            gw.generate_structured(request("x"), &schema).await.unwrap(),
            json!({"a": 1})
        );
        assert!(gw
            .generate_structured(request("x"), &schema)
            .await
            .unwrap_err()
            .is_malformed_output());
        assert!(gw
            .generate_structured(request("x"), &schema)
            .await
            .unwrap_err()
            .is_timeout());
        assert_eq!(gw.calls()[0].schema, Some(schema));
    }

    #[tokio::test]
    async fn test_stream_chunks_then_timeout() {
        let gw = ScriptedGateway::new().on_stream(Reply::ChunksThenTimeout(vec![
            "Hel".into(),
            "lo".into(),
        ]));
        let items: Vec<_> = gw.stream(request("hi")).await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(items[2].as_ref().unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_offline_echo() {
        let gw = ScriptedGateway::offline();
        assert_eq!(gw.complete(request("ping")).await.unwrap(), "ping");
        assert_eq!(
            gw.generate_structured(request("ping"), &json!({})).await.unwrap(),
            json!({})
        );
        let chunks: Vec<_> = gw.stream(request("pong")).await.unwrap().collect().await;
        assert_eq!(chunks[0].as_ref().unwrap(), "pong");
    }
}
