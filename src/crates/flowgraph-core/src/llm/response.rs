//! Provider response types: streaming deltas and usage accounting
//!
//! Providers stream [`ModelDelta`]s. A delta may carry a content chunk, a
//! reasoning chunk, tool-call fragments, a finish reason, usage, or any
//! combination; non-streaming providers send one delta with everything set.
//! The LLM vertex folds deltas into a [`TurnAccumulator`] which yields the
//! completed turn when the stream ends.

use crate::llm::tools::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a provider call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the assistant turn
    Stop,
    /// Token budget hit
    Length,
    /// The model requests tool invocations
    ToolCalls,
}

/// Token usage for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Tokens in the prompt
    pub input_tokens: u64,
    /// Tokens generated
    pub output_tokens: u64,
    /// Reasoning tokens, when the provider reports them separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UsageMetadata {
    /// Sum usage across the calls of a tool loop.
    pub fn accumulate(&mut self, other: &UsageMetadata) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if let Some(r) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += r;
        }
    }

    /// Total tokens for this record.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.reasoning_tokens.unwrap_or(0)
    }
}

/// A fragment of a tool call as it arrives over the stream.
///
/// Providers interleave fragments across calls; fragments with the same
/// `index` belong to one call, with `name`/`id` usually on the first
/// fragment and `arguments` text accreting over subsequent ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within the assistant turn
    pub index: usize,
    /// Call id, when first announced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name, when first announced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw argument text fragment (JSON, possibly split mid-token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One streamed chunk of a provider response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDelta {
    /// Content text chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning text chunk (thinking models)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Tool-call fragments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    /// Set on the final chunk of the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Usage, typically on the final chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl ModelDelta {
    /// A pure content chunk.
    pub fn content(text: impl Into<String>) -> Self {
        Self { content: Some(text.into()), ..Self::default() }
    }

    /// A pure reasoning chunk.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self { reasoning: Some(text.into()), ..Self::default() }
    }

    /// A terminal chunk with a finish reason.
    pub fn finished(reason: FinishReason) -> Self {
        Self { finish_reason: Some(reason), ..Self::default() }
    }
}

/// The folded result of one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    /// Accumulated assistant text
    pub content: String,
    /// Accumulated reasoning text
    pub reasoning: String,
    /// Completed tool calls, in index order
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason of the final chunk, if any arrived
    pub finish_reason: Option<FinishReason>,
    /// Usage reported by the provider
    pub usage: Option<UsageMetadata>,
}

/// Folds streamed deltas into a [`ModelTurn`].
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    content: String,
    reasoning: String,
    partial_calls: Vec<PartialCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<UsageMetadata>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl TurnAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta.
    pub fn push(&mut self, delta: &ModelDelta) {
        if let Some(text) = &delta.content {
            self.content.push_str(text);
        }
        if let Some(text) = &delta.reasoning {
            self.reasoning.push_str(text);
        }
        if let Some(fragments) = &delta.tool_calls {
            for fragment in fragments {
                if self.partial_calls.len() <= fragment.index {
                    self.partial_calls
                        .resize_with(fragment.index + 1, PartialCall::default);
                }
                let slot = &mut self.partial_calls[fragment.index];
                if let Some(id) = &fragment.id {
                    slot.id = Some(id.clone());
                }
                if let Some(name) = &fragment.name {
                    slot.name = Some(name.clone());
                }
                if let Some(args) = &fragment.arguments {
                    slot.arguments.push_str(args);
                }
            }
        }
        if let Some(reason) = delta.finish_reason {
            self.finish_reason = Some(reason);
        }
        if let Some(usage) = delta.usage {
            self.usage = Some(usage);
        }
    }

    /// Finish the turn, materializing completed tool calls.
    ///
    /// Argument fragments that never formed valid JSON fall back to an
    /// empty object so the failure surfaces at invocation, not parsing.
    pub fn finish(self) -> ModelTurn {
        let tool_calls = self
            .partial_calls
            .into_iter()
            .enumerate()
            .filter_map(|(i, partial)| {
                let name = partial.name?;
                let arguments = if partial.arguments.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&partial.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()))
                };
                Some(ToolCall::new(
                    partial.id.unwrap_or_else(|| format!("call-{i}")),
                    name,
                    arguments,
                ))
            })
            .collect();

        ModelTurn {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulates_text_and_reasoning() {
        let mut acc = TurnAccumulator::new();
        acc.push(&ModelDelta::reasoning("thinking "));
        acc.push(&ModelDelta::content("hel"));
        acc.push(&ModelDelta::reasoning("harder"));
        acc.push(&ModelDelta::content("lo"));
        acc.push(&ModelDelta::finished(FinishReason::Stop));

        let turn = acc.finish();
        assert_eq!(turn.content, "hello");
        assert_eq!(turn.reasoning, "thinking harder");
        assert_eq!(turn.finish_reason, Some(FinishReason::Stop));
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn test_assembles_split_tool_call() {
        let mut acc = TurnAccumulator::new();
        acc.push(&ModelDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: Some("call-a".into()),
                name: Some("echo".into()),
                arguments: Some("{\"text\":".into()),
            }]),
            ..ModelDelta::default()
        });
        acc.push(&ModelDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                arguments: Some("\"hi\"}".into()),
                ..ToolCallDelta::default()
            }]),
            finish_reason: Some(FinishReason::ToolCalls),
            ..ModelDelta::default()
        });

        let turn = acc.finish();
        assert_eq!(turn.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call-a");
        assert_eq!(turn.tool_calls[0].name, "echo");
        assert_eq!(turn.tool_calls[0].arguments, json!({"text": "hi"}));
    }

    #[test]
    fn test_interleaved_call_indices() {
        let mut acc = TurnAccumulator::new();
        acc.push(&ModelDelta {
            tool_calls: Some(vec![
                ToolCallDelta { index: 1, name: Some("b".into()), ..ToolCallDelta::default() },
                ToolCallDelta { index: 0, name: Some("a".into()), ..ToolCallDelta::default() },
            ]),
            ..ModelDelta::default()
        });

        let turn = acc.finish();
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].name, "a");
        assert_eq!(turn.tool_calls[1].name, "b");
    }

    #[test]
    fn test_usage_accumulation() {
        let mut total = UsageMetadata::default();
        total.accumulate(&UsageMetadata { input_tokens: 10, output_tokens: 5, reasoning_tokens: None });
        total.accumulate(&UsageMetadata { input_tokens: 20, output_tokens: 7, reasoning_tokens: Some(3) });

        assert_eq!(total.input_tokens, 30);
        assert_eq!(total.output_tokens, 12);
        assert_eq!(total.reasoning_tokens, Some(3));
        assert_eq!(total.total_tokens(), 45);
    }
}
