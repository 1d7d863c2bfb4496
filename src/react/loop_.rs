//! 主循环
//!
//! 每轮：检查取消 → 带完整历史与工具 schema 请求模型 → 按顺序处理候选回复 → 短暂停顿。
//! 候选处理规则：
//! - 非空文本只作为事件/日志输出，不单独写入历史
//! - 含工具调用：逐个记录调用并分发、记录结果，然后丢弃本轮剩余候选
//! - 无工具调用且停止原因为 end_turn：转人工，之后继续处理下一个候选
//!
//! 取消只在每轮开始时检查，不会打断进行中的工具调用；任何致命错误立即结束运行且不重试。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, LoopState};
use crate::llm::{Candidate, LlmClient};
use crate::memory::{ConversationHistory, ToolCallRequest, Turn};
use crate::react::{HumanEscalation, Prompter, ReactEvent};
use crate::tools::ToolRegistry;

/// 每轮之间的默认停顿，避免压满模型网关
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_millis(5);
/// 工具结果预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 自主运行的 Agent：持有模型网关、工具注册表与转人工适配器
pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    escalation: HumanEscalation,
    persona: String,
    prompt: String,
    cycle_delay: Duration,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl AgentLoop {
    /// persona 作为 System 消息，prompt 作为首条 Human 消息
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        prompter: Arc<dyn Prompter>,
        persona: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            registry,
            escalation: HumanEscalation::new(prompter),
            persona: persona.into(),
            prompt: prompt.into(),
            cycle_delay: DEFAULT_CYCLE_DELAY,
            event_tx: None,
        }
    }

    pub fn with_cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 以 System + 首条 Human 消息初始化的历史
    pub fn seed_history(&self) -> ConversationHistory {
        ConversationHistory::seeded(self.persona.clone(), self.prompt.clone())
    }

    /// 运行直到取消（Ok）或出现致命错误（Err）；历史随运行结束丢弃
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AgentError> {
        let mut history = self.seed_history();
        self.drive(&mut history, &cancel).await
    }

    /// 在调用方持有的历史上运行主循环，结束后历史仍可供审计
    pub async fn drive(
        &self,
        history: &mut ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let mut cycle = 0;
        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            cycle += 1;
            tracing::debug!(cycle, turns = history.len(), "cycle started");
            self.send_event(ReactEvent::CycleStarted { cycle });

            if let Err(e) = self.run_cycle(history).await {
                break Err(e);
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.cycle_delay) => {}
            }
        };

        let state = LoopState::from_outcome(&outcome);
        match &outcome {
            Ok(()) => tracing::info!(cycles = cycle, "agent cancelled"),
            Err(e) => tracing::error!(
                cycles = cycle,
                kind = e.kind(),
                fatal = e.is_fatal(),
                error = %e,
                "agent stopped"
            ),
        }
        self.send_event(ReactEvent::Terminated {
            state,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });
        outcome
    }

    /// 单轮：请求模型并处理全部候选回复
    pub async fn run_cycle(&self, history: &mut ConversationHistory) -> Result<(), AgentError> {
        let candidates = self
            .llm
            .generate(history.snapshot(), self.registry.schemas())
            .await?;
        self.process_candidates(history, candidates).await
    }

    async fn process_candidates(
        &self,
        history: &mut ConversationHistory,
        candidates: Vec<Candidate>,
    ) -> Result<(), AgentError> {
        for candidate in candidates {
            if !candidate.text.is_empty() {
                tracing::info!(content = %candidate.text, "assistant says");
                self.send_event(ReactEvent::AssistantSays {
                    text: candidate.text.clone(),
                });
            }

            if !candidate.tool_calls.is_empty() {
                self.perform_tool_calls(history, &candidate.tool_calls).await?;
                // 一轮只执行一个候选的动作
                break;
            }

            if candidate.is_end_turn() {
                self.send_event(ReactEvent::Escalation {
                    question: candidate.text.clone(),
                });
                let reply = self.escalation.escalate(history, &candidate.text).await?;
                self.send_event(ReactEvent::HumanReply { text: reply });
            }
        }
        Ok(())
    }

    async fn perform_tool_calls(
        &self,
        history: &mut ConversationHistory,
        calls: &[ToolCallRequest],
    ) -> Result<(), AgentError> {
        for call in calls {
            history.append(Turn::tool_call(call.clone()));
            self.send_event(ReactEvent::ToolCall {
                call_id: call.call_id.clone(),
                tool: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            });

            let result = self.registry.dispatch(call).await?;

            self.send_event(ReactEvent::ToolResult {
                call_id: result.call_id.clone(),
                tool: result.tool_name.clone(),
                preview: preview(&result.content),
            });
            history.append(Turn::tool_result(result));
        }
        Ok(())
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(content: &str) -> String {
    let head: String = content.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if content.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}
