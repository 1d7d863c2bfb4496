//! LLM 层：模型网关抽象与实现（Anthropic / Mock）

pub mod anthropic;
pub mod mock;
pub mod traits;

pub use anthropic::{AnthropicClient, ANTHROPIC_BASE_URL, ANTHROPIC_VERSION, CLAUDE_3_5_SONNET};
pub use mock::{RecordedRequest, ScriptedLlmClient};
pub use traits::{Candidate, LlmClient, LlmError, StopReason, ToolDefinition};
