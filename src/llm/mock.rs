//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设的候选回复，并记录每次请求的历史快照与工具名；脚本耗尽后返回空回复，
//! 若设置了取消令牌则同时触发取消，便于测试让主循环干净退出。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::{Candidate, LlmClient, LlmError, ToolDefinition};
use crate::memory::Turn;

/// 一次 generate 调用的记录
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub history: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
}

impl RecordedRequest {
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// 脚本化客户端：逐次弹出预设回复
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Vec<Candidate>, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    cancel_when_exhausted: Option<CancellationToken>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次成功回复
    pub fn respond(self, candidates: Vec<Candidate>) -> Self {
        self.lock_script().push_back(Ok(candidates));
        self
    }

    /// 追加一次网关失败
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.lock_script().push_back(Err(message.into()));
        self
    }

    /// 脚本耗尽时取消该令牌
    pub fn cancel_when_exhausted(mut self, token: CancellationToken) -> Self {
        self.cancel_when_exhausted = Some(token);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<Candidate>, String>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Candidate>, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                history: history.to_vec(),
                tools: tools.to_vec(),
            });
        }

        let next = self.lock_script().pop_front();
        match next {
            Some(Ok(candidates)) => Ok(candidates),
            Some(Err(message)) => Err(LlmError::Scripted(message)),
            None => {
                if let Some(token) = &self.cancel_when_exhausted {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let client = ScriptedLlmClient::new()
            .respond(vec![Candidate::text("first")])
            .fail("boom");

        let first = client.generate(&[], &[]).await.unwrap();
        assert_eq!(first, vec![Candidate::text("first")]);

        let second = client.generate(&[], &[]).await;
        assert!(matches!(second, Err(LlmError::Scripted(m)) if m == "boom"));

        assert!(client.generate(&[], &[]).await.unwrap().is_empty());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancels_when_exhausted() {
        let token = CancellationToken::new();
        let client = ScriptedLlmClient::new().cancel_when_exhausted(token.clone());
        client.generate(&[Turn::human("hi")], &[]).await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(client.requests()[0].history, vec![Turn::human("hi")]);
    }
}
