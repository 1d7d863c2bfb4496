//! Minimalprompt - Rust 最小化自主智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 致命错误分类、主循环状态
//! - **llm**: 模型网关抽象与实现（Anthropic / Mock）
//! - **memory**: 单次运行内的只追加对话历史
//! - **observability**: tracing 日志初始化
//! - **react**: 主循环、转人工、过程事件
//! - **tools**: 工具注册表与 executeCommand / writeFile

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{AgentError, LoopState};
pub use react::AgentLoop;
