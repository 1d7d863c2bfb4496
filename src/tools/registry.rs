//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册；
//! dispatch 负责查找处理器、交给处理器解析原始参数并执行，并输出结构化审计日志。
//! 未知工具与参数解析失败都是致命错误，直接返回 AgentError。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolDefinition;
use crate::memory::{ToolCallRequest, ToolCallResult};

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（参数为模型给出的原始 JSON 字符串）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（原样提供给模型）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具，返回写回对话的结果文本。
    /// 领域内的失败（如命令非零退出）应编码进返回文本，只有基础设施故障才返回 Err
    async fn execute(&self, raw_args: &str) -> Result<String, AgentError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 按工具期望的结构解析原始参数，失败时返回 ArgumentDecode
pub fn decode_args<T: DeserializeOwned>(tool: &str, raw_args: &str) -> Result<T, AgentError> {
    serde_json::from_str(raw_args).map_err(|source| AgentError::ArgumentDecode {
        tool: tool.to_string(),
        source,
    })
}

/// 工具注册表：定义列表按注册顺序保存，处理器按名称查找
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具会替换原有处理器与定义（保持原位置）
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let definition = tool.definition();
        let name = definition.name.clone();
        if let Some(slot) = self.definitions.iter_mut().find(|d| d.name == name) {
            tracing::warn!(tool = %name, "tool registered twice, replacing");
            *slot = definition;
        } else {
            self.definitions.push(definition);
        }
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 全部工具定义，每次请求模型时附带
    pub fn schemas(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    /// 分发一次工具调用：未知工具 → UnknownTool；其余错误由处理器给出
    pub async fn dispatch(&self, request: &ToolCallRequest) -> Result<ToolCallResult, AgentError> {
        let tool = self
            .get(&request.tool_name)
            .ok_or_else(|| AgentError::UnknownTool(request.tool_name.clone()))?;

        let start = Instant::now();
        let result = tool.execute(&request.arguments).await;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.tool_name,
            "call_id": request.call_id,
            "ok": result.is_ok(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&request.arguments),
        });
        tracing::info!(audit = %audit, "tool");

        Ok(ToolCallResult {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            content: result?,
        })
    }
}

fn args_preview(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct EchoTool;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        async fn execute(&self, raw_args: &str) -> Result<String, AgentError> {
            let args: EchoArgs = decode_args(self.name(), raw_args)?;
            Ok(args.text)
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let result = registry
            .dispatch(&ToolCallRequest::new("c1", "echo", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.tool_name, "echo");
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .dispatch(&ToolCallRequest::new("c1", "nope", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let err = registry
            .dispatch(&ToolCallRequest::new("c1", "echo", "{\"text\":"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ArgumentDecode { ref tool, .. } if tool == "echo"));
    }

    #[test]
    fn test_schemas_in_registration_order_without_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(EchoTool);
        assert_eq!(registry.schemas().len(), 1);
        assert_eq!(registry.schemas()[0].description, "Echo the text back");
        assert_eq!(registry.tool_names(), vec!["echo".to_string()]);
    }
}
