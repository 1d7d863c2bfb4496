//! 编排层：主循环、转人工、过程事件

pub mod escalation;
pub mod events;
pub mod loop_;

pub use escalation::{HumanEscalation, Prompter, TerminalPrompter};
pub use events::ReactEvent;
pub use loop_::{AgentLoop, DEFAULT_CYCLE_DELAY};
