//! LLM vertex: message assembly, streaming relay, tool-call loop
//!
//! Execution proceeds through a small state machine: assemble the message
//! list (templated system prompt, optional conversation history, templated
//! user message with optional image part), call the provider, relay deltas
//! as [`Message`](crate::event::EventKind::Message) /
//! [`Reasoning`](crate::event::EventKind::Reasoning) events, then either
//! finish or dispatch the requested tool calls and call the provider again
//! with the extended conversation. The loop is bounded by
//! `max_tool_iterations` (default 8).
//!
//! Cancellation closes the provider stream by dropping it; content
//! accumulated in the cancelled call is discarded, never published as
//! partial output.
//!
//! # Input conventions
//!
//! Two resolved-input keys are recognized beyond template variables:
//! `conversation_history` (a list of `{role, content}` objects appended
//! verbatim after the system message) and `image_url` (a string that turns
//! the user message into multipart text + image content).

use crate::binding::render_template;
use crate::context::RunContext;
use crate::error::{FlowError, Result};
use crate::event::{EventKind, ToolCallPhase};
use crate::llm::response::FinishReason;
use crate::llm::tools::{ToolCall, ToolDescriptor, ToolTraceEntry};
use crate::llm::{ModelProvider, ModelRequest, ModelTurn, TurnAccumulator, UsageMetadata};
use crate::messages::{ContentPart, Message};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Default bound on provider follow-up rounds triggered by tool calls.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 8;

/// Configuration for an LLM vertex.
#[derive(Clone)]
pub struct LlmConfig {
    /// The model backend
    pub provider: Arc<dyn ModelProvider>,
    /// System prompt template (`{{name}}` markers allowed)
    pub system_prompt: String,
    /// User message template (`{{name}}` markers allowed)
    pub user_template: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_tokens: Option<u32>,
    /// Tools the model may call
    pub tools: Vec<ToolDescriptor>,
    /// Request streamed deltas from the provider
    pub enable_stream: bool,
    /// Request separated reasoning deltas
    pub enable_reasoning: bool,
    /// Bound on tool-dispatch rounds
    pub max_tool_iterations: usize,
}

impl LlmConfig {
    /// Create a config with streaming on and no tools.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            system_prompt: String::new(),
            user_template: String::new(),
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
            enable_stream: true,
            enable_reasoning: false,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    /// Set the system prompt template.
    pub fn with_system(mut self, template: impl Into<String>) -> Self {
        self.system_prompt = template.into();
        self
    }

    /// Set the user message template.
    pub fn with_user_template(mut self, template: impl Into<String>) -> Self {
        self.user_template = template.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Attach callable tools.
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Toggle streamed delivery.
    pub fn with_stream(mut self, enable: bool) -> Self {
        self.enable_stream = enable;
        self
    }

    /// Toggle separated reasoning.
    pub fn with_reasoning(mut self, enable: bool) -> Self {
        self.enable_reasoning = enable;
        self
    }

    /// Override the tool-loop bound.
    pub fn with_max_tool_iterations(mut self, bound: usize) -> Self {
        self.max_tool_iterations = bound;
        self
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("enable_stream", &self.enable_stream)
            .field("enable_reasoning", &self.enable_reasoning)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .finish()
    }
}

/// Execute an LLM vertex to completion.
pub(crate) async fn run_llm(
    vertex_id: &str,
    config: &LlmConfig,
    ctx: &Arc<RunContext>,
    inputs: Map<String, Value>,
) -> Result<Value> {
    // Pre-flight: both templates must render before any provider call.
    let system = render_template(&config.system_prompt, &inputs)?;
    let user = render_template(&config.user_template, &inputs)?;

    let mut messages = vec![Message::system(system)];
    if let Some(history) = inputs.get("conversation_history").and_then(Value::as_array) {
        messages.extend(history.iter().filter_map(Message::from_history_value));
    }
    messages.push(build_user_message(user, inputs.get("image_url")));

    let definitions = config.tools.iter().map(|t| t.definition()).collect::<Vec<_>>();
    let mut usage = UsageMetadata::default();
    let mut saw_usage = false;
    let mut reasoning = String::new();
    let mut tool_trace: Vec<ToolTraceEntry> = Vec::new();
    let mut rounds = 0usize;

    loop {
        let mut request = ModelRequest::new(messages.clone())
            .with_tools(definitions.clone())
            .with_stream(config.enable_stream)
            .with_reasoning(config.enable_reasoning);
        if let Some(t) = config.temperature {
            request = request.with_temperature(t);
        }
        if let Some(m) = config.max_tokens {
            request = request.with_max_tokens(m);
        }

        let turn = relay_turn(vertex_id, config, ctx, request).await?;
        if let Some(turn_usage) = &turn.usage {
            usage.accumulate(turn_usage);
            saw_usage = true;
        }
        reasoning.push_str(&turn.reasoning);

        if turn.finish_reason != Some(FinishReason::ToolCalls) || turn.tool_calls.is_empty() {
            return Ok(final_output(&turn, &reasoning, tool_trace, saw_usage.then_some(usage)));
        }

        rounds += 1;
        if rounds > config.max_tool_iterations {
            return Err(FlowError::ToolLoopExhausted {
                vertex: vertex_id.to_string(),
                iterations: config.max_tool_iterations,
            });
        }
        tracing::debug!(vertex = vertex_id, round = rounds, calls = turn.tool_calls.len(), "dispatching tool calls");

        let mut results = Vec::with_capacity(turn.tool_calls.len());
        let mut first_error: Option<FlowError> = None;
        let mut any_succeeded = false;

        for call in &turn.tool_calls {
            ctx.emit(
                Some(vertex_id.to_string()),
                EventKind::ToolCall {
                    tool_name: call.name.clone(),
                    phase: ToolCallPhase::Start,
                    args: Some(call.arguments.clone()),
                    result: None,
                },
            );
            let outcome = invoke_tool(config, call).await;
            ctx.emit(
                Some(vertex_id.to_string()),
                EventKind::ToolCall {
                    tool_name: call.name.clone(),
                    phase: ToolCallPhase::End,
                    args: None,
                    result: Some(match &outcome {
                        Ok(value) => value.clone(),
                        Err(e) => json!({"error": e.to_string()}),
                    }),
                },
            );
            match &outcome {
                Ok(value) => {
                    any_succeeded = true;
                    tool_trace.push(ToolTraceEntry::success(&call.name, call.arguments.clone(), value.clone()));
                }
                Err(e) => {
                    tracing::warn!(vertex = vertex_id, tool = %call.name, error = %e, "tool call failed");
                    tool_trace.push(ToolTraceEntry::failure(&call.name, call.arguments.clone(), e.to_string()));
                    first_error.get_or_insert_with(|| e.clone());
                }
            }
            results.push((call.clone(), outcome));
        }

        // A round where every requested call failed fails the vertex.
        if !any_succeeded {
            return Err(first_error.unwrap_or_else(|| FlowError::tool("", "no tool calls dispatched")));
        }

        messages.push(Message::assistant_with_tool_calls(
            turn.content.clone(),
            turn.tool_calls.clone(),
        ));
        for (call, outcome) in results {
            let payload = match outcome {
                Ok(value) => value.to_string(),
                Err(e) => json!({"error": e.to_string()}).to_string(),
            };
            messages.push(Message::tool(call.id, payload));
        }
    }
}

fn build_user_message(user: String, image_url: Option<&Value>) -> Message {
    match image_url.and_then(Value::as_str) {
        Some(url) => Message::user_parts(vec![
            ContentPart::Text { text: user },
            ContentPart::ImageUrl { url: url.to_string() },
        ]),
        None => Message::user(user),
    }
}

fn final_output(
    turn: &ModelTurn,
    reasoning: &str,
    tool_trace: Vec<ToolTraceEntry>,
    usage: Option<UsageMetadata>,
) -> Value {
    let mut out = Map::new();
    out.insert("response".to_string(), Value::String(turn.content.clone()));
    out.insert(
        "reasoning".to_string(),
        if reasoning.is_empty() { Value::Null } else { Value::String(reasoning.to_string()) },
    );
    out.insert(
        "tool_trace".to_string(),
        serde_json::to_value(tool_trace).unwrap_or_else(|_| Value::Array(Vec::new())),
    );
    if let Some(usage) = usage {
        if let Ok(value) = serde_json::to_value(usage) {
            out.insert("usage".to_string(), value);
        }
    }
    Value::Object(out)
}

/// Consume one provider call, relaying deltas as events.
///
/// On cancellation the stream is dropped, which closes the transport, and
/// the accumulated partial turn is discarded.
async fn relay_turn(
    vertex_id: &str,
    config: &LlmConfig,
    ctx: &Arc<RunContext>,
    request: ModelRequest,
) -> Result<ModelTurn> {
    let mut stream = config.provider.invoke(request).await?;
    let mut acc = TurnAccumulator::new();
    let cancel = ctx.cancel_token().clone();

    loop {
        tokio::select! {
            // Check cancellation before draining further deltas.
            biased;
            _ = cancel.cancelled() => {
                drop(stream);
                return Err(FlowError::Cancelled);
            }
            next = stream.next() => match next {
                Some(Ok(delta)) => {
                    if let Some(text) = &delta.content {
                        ctx.emit(Some(vertex_id.to_string()), EventKind::Message { text: text.clone() });
                    }
                    if let Some(text) = &delta.reasoning {
                        ctx.emit(Some(vertex_id.to_string()), EventKind::Reasoning { text: text.clone() });
                    }
                    acc.push(&delta);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }
    Ok(acc.finish())
}

async fn invoke_tool(config: &LlmConfig, call: &ToolCall) -> Result<Value> {
    let descriptor = config
        .tools
        .iter()
        .find(|t| t.name == call.name)
        .ok_or_else(|| FlowError::tool(&call.name, "unknown tool"))?;
    descriptor.validate_args(&call.arguments)?;
    descriptor.invoke(call.arguments.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::llm::response::ToolCallDelta;
    use crate::llm::{DeltaStream, ModelDelta};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Provider that replays scripted turns, one per invocation.
    struct Scripted {
        turns: Vec<Vec<ModelDelta>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(turns: Vec<Vec<ModelDelta>>) -> Arc<Self> {
            Arc::new(Self { turns, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ModelProvider for Scripted {
        async fn invoke(&self, _request: ModelRequest) -> Result<DeltaStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let deltas = self.turns.get(n).cloned().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(deltas.into_iter().map(Ok))))
        }
    }

    fn ctx() -> Arc<RunContext> {
        RunContext::new(
            HashMap::new(),
            HashMap::new(),
            EventBus::default(),
            CancellationToken::new(),
        )
    }

    fn tool_call_turn(name: &str, args: &str) -> Vec<ModelDelta> {
        vec![ModelDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: Some("call-1".to_string()),
                name: Some(name.to_string()),
                arguments: Some(args.to_string()),
            }]),
            finish_reason: Some(FinishReason::ToolCalls),
            ..ModelDelta::default()
        }]
    }

    fn echo_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "echo",
            "Return the arguments unchanged",
            json!({"type": "object"}),
            |args| Box::pin(async move { Ok(args) }),
        )
    }

    #[tokio::test]
    async fn test_plain_response() {
        let provider = Scripted::new(vec![vec![
            ModelDelta::content("hel"),
            ModelDelta::content("lo"),
            ModelDelta::finished(FinishReason::Stop),
        ]]);
        let config = LlmConfig::new(provider)
            .with_system("answer")
            .with_user_template("say {{word}}");

        let mut inputs = Map::new();
        inputs.insert("word".to_string(), json!("hello"));
        let out = run_llm("llm", &config, &ctx(), inputs).await.unwrap();

        assert_eq!(out["response"], json!("hello"));
        assert_eq!(out["reasoning"], Value::Null);
        assert_eq!(out["tool_trace"], json!([]));
    }

    #[tokio::test]
    async fn test_missing_template_variable_fails_preflight() {
        let provider = Scripted::new(vec![]);
        let config = LlmConfig::new(provider).with_user_template("say {{word}}");

        match run_llm("llm", &config, &ctx(), Map::new()).await {
            Err(FlowError::MissingTemplateVariable { name }) => assert_eq!(name, "word"),
            other => panic!("expected MissingTemplateVariable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_loop_roundtrip() {
        let provider = Scripted::new(vec![
            tool_call_turn("echo", "{\"text\":\"hi\"}"),
            vec![ModelDelta::content("done"), ModelDelta::finished(FinishReason::Stop)],
        ]);
        let config = LlmConfig::new(provider)
            .with_system("answer")
            .with_user_template("call echo with {{q}}")
            .with_tools(vec![echo_tool()]);

        let ctx = ctx();
        let mut sub = ctx.bus().subscribe();
        let mut inputs = Map::new();
        inputs.insert("q".to_string(), json!("hi"));

        let out = run_llm("llm", &config, &ctx, inputs).await.unwrap();
        assert_eq!(out["response"], json!("done"));
        let trace = out["tool_trace"].as_array().unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0]["name"], json!("echo"));
        assert_eq!(trace[0]["args"], json!({"text": "hi"}));
        assert_eq!(trace[0]["result"], json!({"text": "hi"}));

        let mut starts = 0;
        let mut ends = 0;
        while let Some(event) = sub.try_recv() {
            if let EventKind::ToolCall { phase, .. } = event.kind {
                match phase {
                    ToolCallPhase::Start => starts += 1,
                    ToolCallPhase::End => ends += 1,
                }
            }
        }
        assert_eq!(starts, 1, "exactly one ToolCall start");
        assert_eq!(ends, 1, "exactly one ToolCall end");
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_vertex() {
        // Zero tools configured, but the model requests one.
        let provider = Scripted::new(vec![tool_call_turn("echo", "{}")]);
        let config = LlmConfig::new(provider).with_user_template("go");

        match run_llm("llm", &config, &ctx(), Map::new()).await {
            Err(FlowError::ToolInvocation { tool, error }) => {
                assert_eq!(tool, "echo");
                assert!(error.contains("unknown tool"));
            }
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_loop_exhaustion() {
        // The model requests the same tool forever.
        let turns = (0..10).map(|_| tool_call_turn("echo", "{}")).collect();
        let provider = Scripted::new(turns);
        let config = LlmConfig::new(provider)
            .with_user_template("go")
            .with_tools(vec![echo_tool()])
            .with_max_tool_iterations(3);

        match run_llm("llm", &config, &ctx(), Map::new()).await {
            Err(FlowError::ToolLoopExhausted { iterations, .. }) => assert_eq!(iterations, 3),
            other => panic!("expected ToolLoopExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reasoning_relay() {
        let provider = Scripted::new(vec![vec![
            ModelDelta::reasoning("let me think"),
            ModelDelta::content("42"),
            ModelDelta::finished(FinishReason::Stop),
        ]]);
        let config = LlmConfig::new(provider)
            .with_user_template("answer")
            .with_reasoning(true);

        let ctx = ctx();
        let mut sub = ctx.bus().subscribe();
        let out = run_llm("llm", &config, &ctx, Map::new()).await.unwrap();

        assert_eq!(out["reasoning"], json!("let me think"));
        let mut saw_reasoning = false;
        while let Some(event) = sub.try_recv() {
            if matches!(event.kind, EventKind::Reasoning { .. }) {
                saw_reasoning = true;
            }
        }
        assert!(saw_reasoning, "reasoning deltas must be relayed as events");
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_rounds() {
        let mut first = tool_call_turn("echo", "{}");
        first[0].usage = Some(UsageMetadata { input_tokens: 10, output_tokens: 2, reasoning_tokens: None });
        let second = vec![
            ModelDelta::content("done"),
            ModelDelta {
                finish_reason: Some(FinishReason::Stop),
                usage: Some(UsageMetadata { input_tokens: 20, output_tokens: 3, reasoning_tokens: None }),
                ..ModelDelta::default()
            },
        ];
        let provider = Scripted::new(vec![first, second]);
        let config = LlmConfig::new(provider)
            .with_user_template("go")
            .with_tools(vec![echo_tool()]);

        let out = run_llm("llm", &config, &ctx(), Map::new()).await.unwrap();
        assert_eq!(out["usage"]["input_tokens"], json!(30));
        assert_eq!(out["usage"]["output_tokens"], json!(5));
    }

    #[tokio::test]
    async fn test_cancellation_discards_partial_content() {
        let provider = Scripted::new(vec![vec![
            ModelDelta::content("partial"),
            ModelDelta::finished(FinishReason::Stop),
        ]]);
        let config = LlmConfig::new(provider).with_user_template("go");

        let ctx = ctx();
        ctx.cancel_token().cancel();
        match run_llm("llm", &config, &ctx, Map::new()).await {
            Err(FlowError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_url_builds_multipart_message() {
        let msg = build_user_message("describe".to_string(), Some(&json!("https://x/cat.png")));
        match msg.content {
            crate::messages::MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }
}
