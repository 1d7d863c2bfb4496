//! Agent 错误类型
//!
//! 这里只有致命错误：任一变体都会终止主循环并原样交给调用方。
//! 命令执行失败属于可恢复结果，作为 ToolResult 文本回传给模型，不在此列。

use thiserror::Error;

use crate::llm::LlmError;

/// 主循环运行过程中的致命错误（模型网关、未知工具、参数解析、写文件、用户交互、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 模型调用了从未提供给它的工具
    #[error("unrecognised tool call from model: {0:?}")]
    UnknownTool(String),

    #[error("could not parse tool call arguments: {tool:?}: {source}")]
    ArgumentDecode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tool call failed: {tool:?}: {cause}")]
    ToolExecution { tool: String, cause: String },

    #[error("prompting user failed: {0}")]
    Escalation(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 出错的工具名（与工具无关的错误返回 None）
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            AgentError::UnknownTool(tool)
            | AgentError::ArgumentDecode { tool, .. }
            | AgentError::ToolExecution { tool, .. } => Some(tool),
            _ => None,
        }
    }

    /// 是否终止主循环。可恢复的结果（如命令失败）不以 AgentError 表示，因此所有变体均为致命
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::Llm(_)
            | AgentError::UnknownTool(_)
            | AgentError::ArgumentDecode { .. }
            | AgentError::ToolExecution { .. }
            | AgentError::Escalation(_)
            | AgentError::Config(_) => true,
        }
    }

    /// 简短分类名，用于日志与事件
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Llm(_) => "llm",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::ArgumentDecode { .. } => "argument_decode",
            AgentError::ToolExecution { .. } => "tool_execution",
            AgentError::Escalation(_) => "escalation",
            AgentError::Config(_) => "config",
        }
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}
