//! 主循环过程事件：供外层展示模型发言、工具调用、结果与转人工

use serde::Serialize;

use crate::core::LoopState;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 新一轮开始（从 1 计数）
    CycleStarted { cycle: usize },
    /// 模型的文本输出
    AssistantSays { text: String },
    /// 调用工具（arguments 为原始 JSON 字符串）
    ToolCall {
        call_id: String,
        tool: String,
        arguments: String,
    },
    /// 工具返回（预览，避免过长）
    ToolResult {
        call_id: String,
        tool: String,
        preview: String,
    },
    /// 转交用户
    Escalation { question: String },
    /// 用户回复
    HumanReply { text: String },
    /// 运行结束
    Terminated {
        state: LoopState,
        error: Option<String>,
    },
}
