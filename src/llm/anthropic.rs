//! Anthropic Messages API 客户端
//!
//! 通过 reqwest 调用 `/v1/messages`。历史映射规则：
//! - System Turn → 顶层 `system`
//! - Human / Assistant 文本 → text 块；工具调用 → tool_use 块（input 原样转发模型给出的 JSON）
//! - ToolResult Turn → user 消息中的 tool_result 块
//!
//! 回复中的每个 content 块各自成为一个 Candidate，并共享回复的 stop_reason。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::config::LlmSection;
use crate::llm::{Candidate, LlmClient, LlmError, StopReason, ToolDefinition};
use crate::memory::{Part, Role, ToolCallRequest, Turn};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CLAUDE_3_5_SONNET: &str = "claude-3-5-sonnet-20240620";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

/// 请求与回复共用的 content 块（平铺字段，便于 RawValue 原样透传 input）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl ContentBlock {
    fn text(text: &str) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    fn tool_use(req: &ToolCallRequest) -> Result<Self, LlmError> {
        let raw = if req.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            req.arguments.clone()
        };
        let input = RawValue::from_string(raw)
            .map_err(|e| LlmError::Encode(format!("tool call {}: {}", req.call_id, e)))?;
        Ok(Self {
            kind: "tool_use".into(),
            id: Some(req.call_id.clone()),
            name: Some(req.tool_name.clone()),
            input: Some(input),
            ..Self::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Anthropic 客户端：持有 HTTP Client、API Key 与模型参数
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// 按 [llm] 配置创建；API Key 优先取配置，其次 ANTHROPIC_API_KEY
    pub fn new(settings: &LlmSection) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: settings.api_version.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &'a self,
        history: &[Turn],
        tools: &'a [ToolDefinition],
    ) -> Result<MessagesRequest<'a>, LlmError> {
        build_request(&self.model, self.max_tokens, history, tools)
    }
}

fn build_request<'a>(
    model: &'a str,
    max_tokens: u32,
    history: &[Turn],
    tools: &'a [ToolDefinition],
) -> Result<MessagesRequest<'a>, LlmError> {
    let mut system = None;
    let mut messages = Vec::with_capacity(history.len());

    for turn in history {
        let role = match turn.role {
            Role::System => {
                system = turn.text().map(str::to_string);
                continue;
            }
            Role::Human | Role::ToolResult => "user",
            Role::Assistant => "assistant",
        };

        let mut content = Vec::new();
        for part in turn.parts() {
            match part {
                // 空文本块会被 API 拒绝，只在线上格式中略去，历史本身不变
                Part::Text { text } if text.is_empty() => {}
                Part::Text { text } => content.push(ContentBlock::text(&text)),
                Part::ToolCall(req) => content.push(ContentBlock::tool_use(&req)?),
                Part::ToolResult(res) => content.push(ContentBlock {
                    kind: "tool_result".into(),
                    tool_use_id: Some(res.call_id),
                    content: Some(res.content),
                    ..ContentBlock::default()
                }),
            }
        }
        if !content.is_empty() {
            messages.push(WireMessage { role, content });
        }
    }

    Ok(MessagesRequest {
        model,
        max_tokens,
        system,
        messages,
        tools: tools
            .iter()
            .map(|t| WireTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect(),
    })
}

/// 每个 content 块映射为一个 Candidate
fn candidates_from_response(response: MessagesResponse) -> Vec<Candidate> {
    let stop_reason = response.stop_reason.as_deref().map(StopReason::parse);
    response
        .content
        .into_iter()
        .filter_map(|block| match block.kind.as_str() {
            "text" => Some(Candidate {
                text: block.text.unwrap_or_default(),
                tool_calls: Vec::new(),
                stop_reason: stop_reason.clone(),
            }),
            "tool_use" => Some(Candidate {
                text: String::new(),
                tool_calls: vec![ToolCallRequest {
                    call_id: block.id.unwrap_or_default(),
                    tool_name: block.name.unwrap_or_default(),
                    arguments: block
                        .input
                        .map(|raw| raw.get().to_string())
                        .unwrap_or_default(),
                }],
                stop_reason: stop_reason.clone(),
            }),
            other => {
                tracing::debug!(kind = %other, "ignoring content block");
                None
            }
        })
        .collect()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Candidate>, LlmError> {
        let request = self.build_request(history, tools)?;

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            blocks = parsed.content.len(),
            stop_reason = ?parsed.stop_reason,
            "anthropic response"
        );
        Ok(candidates_from_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConversationHistory, ToolCallResult};

    fn tool_defs() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "writeFile".into(),
            description: "Write a file to the filesystem".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]
    }

    #[test]
    fn test_request_maps_roles_and_system() {
        let mut history = ConversationHistory::seeded("persona", "do it");
        history.append(Turn::assistant("question?"));
        history.append(Turn::human("answer"));
        let tools = tool_defs();

        let req = build_request("m", 1024, history.snapshot(), &tools).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["system"], "persona");
        assert_eq!(json["messages"].as_array().unwrap().len(), 3);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["text"], "do it");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["tools"][0]["name"], "writeFile");
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_tool_use_input_forwarded_verbatim() {
        let raw = r#"{"path":"a.txt",   "content":"x"}"#;
        let mut history = ConversationHistory::seeded("p", "q");
        history.append(Turn::tool_call(ToolCallRequest::new("toolu_1", "writeFile", raw)));
        history.append(Turn::tool_result(ToolCallResult {
            call_id: "toolu_1".into(),
            tool_name: "writeFile".into(),
            content: "ok".into(),
        }));

        let req = build_request("m", 1024, history.snapshot(), &[]).unwrap();
        let body = serde_json::to_string(&req).unwrap();
        assert!(body.contains(raw));
        assert!(!body.contains("\"tools\""));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["messages"][2]["role"], "user");
        assert_eq!(json["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(json["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_empty_human_reply_is_dropped_from_wire() {
        let mut history = ConversationHistory::seeded("p", "q");
        history.append(Turn::human(""));
        let req = build_request("m", 1024, history.snapshot(), &[]).unwrap();
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_invalid_tool_arguments_fail_encoding() {
        let mut history = ConversationHistory::new();
        history.append(Turn::tool_call(ToolCallRequest::new("1", "writeFile", "{not json")));
        let err = build_request("m", 1024, history.snapshot(), &[]).unwrap_err();
        assert!(matches!(err, LlmError::Encode(_)));
    }

    #[test]
    fn test_each_block_becomes_a_candidate() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "Let me check"},
                {"type": "tool_use", "id": "toolu_9", "name": "executeCommand", "input": {"command":  "ls"}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        let candidates = candidates_from_response(parsed);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "Let me check");
        assert!(candidates[0].tool_calls.is_empty());
        assert_eq!(candidates[0].stop_reason, Some(StopReason::ToolUse));

        let call = &candidates[1].tool_calls[0];
        assert_eq!(call.call_id, "toolu_9");
        assert_eq!(call.tool_name, "executeCommand");
        assert_eq!(call.arguments, r#"{"command":  "ls"}"#);
    }

    #[test]
    fn test_end_turn_response() {
        let body = r#"{"content":[{"type":"text","text":"What colour?"}],"stop_reason":"end_turn"}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        let candidates = candidates_from_response(parsed);
        assert_eq!(candidates, vec![Candidate::end_turn("What colour?")]);
    }
}
