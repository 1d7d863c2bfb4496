//! 转人工
//!
//! 模型以 end_turn 结束且没有工具调用时，HumanEscalation 把模型的文本作为问题交给 Prompter，
//! 并把问题（Assistant）与原始回复（Human，不做裁剪或校验）依次写入对话历史。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::core::AgentError;
use crate::memory::{ConversationHistory, Turn};

/// 与用户交互的能力：展示问题并阻塞等待回复
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, question: &str) -> std::io::Result<String>;
}

#[async_trait]
impl<T: Prompter + ?Sized> Prompter for Arc<T> {
    async fn prompt(&self, question: &str) -> std::io::Result<String> {
        (**self).prompt(question).await
    }
}

/// 终端交互：写出问题与 `reply>` 提示，读到输入流结束（EOF / Ctrl-D）为止
pub struct TerminalPrompter<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> TerminalPrompter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

impl TerminalPrompter<tokio::io::Stdin, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Prompter for TerminalPrompter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn prompt(&self, question: &str) -> std::io::Result<String> {
        let mut guard = self.io.lock().await;
        let (reader, writer) = &mut *guard;

        writer.write_all(format!("{question}\n\nreply>").as_bytes()).await?;
        writer.flush().await?;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// 转人工适配器
pub struct HumanEscalation {
    prompter: Arc<dyn Prompter>,
}

impl HumanEscalation {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self { prompter }
    }

    /// 记录问题 → 等待回复 → 记录回复；交互失败为致命错误
    pub async fn escalate(
        &self,
        history: &mut ConversationHistory,
        question: &str,
    ) -> Result<String, AgentError> {
        history.append(Turn::assistant(question));

        let reply = self
            .prompter
            .prompt(question)
            .await
            .map_err(|e| AgentError::Escalation(e.to_string()))?;

        history.append(Turn::human(reply.clone()));
        Ok(reply)
    }
}
