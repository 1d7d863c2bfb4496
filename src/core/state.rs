//! 主循环状态
//!
//! Running 为初始状态；观察到取消时进入 TerminatedClean，出现致命错误时进入 TerminatedError。

use serde::Serialize;

use crate::core::AgentError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    TerminatedClean,
    TerminatedError,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LoopState::Running)
    }

    /// 由一次运行的结果推出终止状态
    pub fn from_outcome<T>(outcome: &Result<T, AgentError>) -> Self {
        match outcome {
            Ok(_) => LoopState::TerminatedClean,
            Err(_) => LoopState::TerminatedError,
        }
    }
}
