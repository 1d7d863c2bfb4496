//! LLM 客户端抽象
//!
//! 所有后端（Anthropic / Mock）实现 LlmClient：generate 接收完整历史与工具 schema，返回零个或多个候选回复。
//! 本层不做重试，失败直接交给主循环终止运行。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::memory::{ToolCallRequest, Turn};

/// 模型网关错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("missing API key (set ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("encode request: {0}")]
    Encode(String),

    #[error("{0}")]
    Scripted(String),
}

/// 提供给模型的工具定义（名称唯一，运行期间不变）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 候选回复的停止原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// 模型结束本轮，不再自主行动
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::Other(s) => s,
        }
    }
}

/// 单个候选回复：可选文本、零个或多个工具调用、可选停止原因
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub stop_reason: Option<StopReason>,
}

impl Candidate {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// 文本 + end_turn：模型等待用户输入
    pub fn end_turn(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            stop_reason: Some(StopReason::EndTurn),
        }
    }

    pub fn tool_call(request: ToolCallRequest) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![request],
            stop_reason: Some(StopReason::ToolUse),
        }
    }

    pub fn is_end_turn(&self) -> bool {
        self.stop_reason == Some(StopReason::EndTurn)
    }
}

/// LLM 客户端 trait：给定历史与工具 schema，返回候选回复
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Candidate>, LlmError>;
}
