//! 对话历史
//!
//! 只追加的 Turn 日志：System（至多一条且位于首位）→ Human → Assistant / ToolResult 交替增长。
//! 不提供删除或修改接口，已提交给模型的 Turn 保持稳定，便于审计与构造下一次请求。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    Human,
    Assistant,
    ToolResult,
}

/// 模型发起的工具调用；arguments 为模型给出的原始 JSON 字符串，记录时不做任何格式化
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 工具执行结果，通过 call_id 对应到此前的 ToolCallRequest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
}

/// Turn 内容片段
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

/// Turn 内容：纯文本或一个以上的片段
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<Part>),
}

/// 对话中的一条不可变记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Assistant 发起的一次工具调用
    pub fn tool_call(request: ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Parts(vec![Part::ToolCall(request)]),
        }
    }

    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            role: Role::ToolResult,
            content: TurnContent::Parts(vec![Part::ToolResult(result)]),
        }
    }

    /// 纯文本内容；片段形式时返回 None
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(t) => Some(t),
            TurnContent::Parts(_) => None,
        }
    }

    /// 统一以片段视图遍历内容（纯文本视为单个 Text 片段）
    pub fn parts(&self) -> Vec<Part> {
        match &self.content {
            TurnContent::Text(t) => vec![Part::Text { text: t.clone() }],
            TurnContent::Parts(p) => p.clone(),
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        let parts: &[Part] = match &self.content {
            TurnContent::Parts(p) => p,
            TurnContent::Text(_) => &[],
        };
        parts.iter().filter_map(|p| match p {
            Part::ToolCall(req) => Some(req),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolCallResult> {
        let parts: &[Part] = match &self.content {
            TurnContent::Parts(p) => p,
            TurnContent::Text(_) => &[],
        };
        parts.iter().filter_map(|p| match p {
            Part::ToolResult(res) => Some(res),
            _ => None,
        })
    }
}

/// 对话历史：单写者、只追加
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 System + 首条 Human 消息初始化
    pub fn seeded(persona: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.append(Turn::system(persona));
        history.append(Turn::human(prompt));
        history
    }

    /// 追加到末尾。System Turn 只允许作为首条出现，否则降级为 Human 记录，保持顺序不变
    pub fn append(&mut self, turn: Turn) {
        if turn.role == Role::System && !self.turns.is_empty() {
            tracing::warn!("system turn appended after conversation start, recording as human");
            self.turns.push(Turn {
                role: Role::Human,
                content: turn.content,
            });
            return;
        }
        self.turns.push(turn);
    }

    /// 完整有序快照，供提交给模型
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 尚无对应 ToolResult 的工具调用 id（按出现顺序）
    pub fn pending_tool_calls(&self) -> Vec<&str> {
        let mut pending: Vec<&str> = Vec::new();
        for turn in &self.turns {
            for req in turn.tool_calls() {
                pending.push(req.call_id.as_str());
            }
            for res in turn.tool_results() {
                if let Some(pos) = pending.iter().position(|id| *id == res.call_id) {
                    pending.remove(pos);
                }
            }
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_history_starts_with_system_then_human() {
        let history = ConversationHistory::seeded("You are a Software Engineer", "Build a calculator");
        let turns = history.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].text(), Some("You are a Software Engineer"));
        assert_eq!(turns[1].role, Role::Human);
        assert_eq!(turns[1].text(), Some("Build a calculator"));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = ConversationHistory::new();
        history.append(Turn::human("a"));
        history.append(Turn::assistant("b"));
        history.append(Turn::human("c"));
        let texts: Vec<_> = history.snapshot().iter().filter_map(|t| t.text()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_late_system_turn_is_not_recorded_as_system() {
        let mut history = ConversationHistory::seeded("persona", "prompt");
        history.append(Turn::system("another persona"));
        let systems = history
            .snapshot()
            .iter()
            .filter(|t| t.role == Role::System)
            .count();
        assert_eq!(systems, 1);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_pending_tool_calls_tracks_unmatched_requests() {
        let mut history = ConversationHistory::new();
        history.append(Turn::tool_call(ToolCallRequest::new("1", "writeFile", "{}")));
        assert_eq!(history.pending_tool_calls(), vec!["1"]);

        history.append(Turn::tool_result(ToolCallResult {
            call_id: "1".into(),
            tool_name: "writeFile".into(),
            content: "ok".into(),
        }));
        assert!(history.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_parts_view_of_text_turn() {
        let turn = Turn::assistant("hi");
        assert_eq!(turn.parts(), vec![Part::Text { text: "hi".into() }]);
        assert_eq!(turn.tool_calls().count(), 0);
    }
}
