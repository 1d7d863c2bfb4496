//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MINIMALPROMPT__*` 覆盖（双下划线表示嵌套，如 `MINIMALPROMPT__LLM__MODEL=...`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{ANTHROPIC_BASE_URL, ANTHROPIC_VERSION, CLAUDE_3_5_SONNET};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [llm] 段：模型、端点与请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 目前仅支持 anthropic
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_version: String,
    /// 未设置时读取环境变量 ANTHROPIC_API_KEY
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: CLAUDE_3_5_SONNET.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_version: ANTHROPIC_VERSION.to_string(),
            api_key: None,
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

/// [agent] 段：主循环节奏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 每轮之间的停顿（毫秒），避免压满模型网关
    pub cycle_delay_ms: u64,
}

impl AgentSection {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { cycle_delay_ms: 5 }
    }
}

/// [tools] 段：执行命令所用的 shell 与可选超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub shell: PathBuf,
    /// 单条命令超时（秒），未设置表示不限时
    pub command_timeout_secs: Option<u64>,
}

impl ToolsSection {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/usr/bin/bash"),
            command_timeout_secs: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MINIMALPROMPT__* 可覆盖
///
/// 1. 查找 config/default.toml，存在则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MINIMALPROMPT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    if std::path::Path::new("config/default.toml").exists() {
        builder = builder.add_source(config::File::with_name("config/default").required(false));
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MINIMALPROMPT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.model, CLAUDE_3_5_SONNET);
        assert_eq!(config.agent.cycle_delay(), Duration::from_millis(5));
        assert_eq!(config.tools.shell, PathBuf::from("/usr/bin/bash"));
        assert!(config.tools.command_timeout().is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"claude-test\"\nmax_tokens = 256\n\n[agent]\ncycle_delay_ms = 50\n\n[tools]\ncommand_timeout_secs = 10"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.llm.model, "claude-test");
        assert_eq!(config.llm.max_tokens, 256);
        assert_eq!(config.llm.base_url, ANTHROPIC_BASE_URL);
        assert_eq!(config.agent.cycle_delay_ms, 50);
        assert_eq!(config.tools.command_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\ncycle_delay_ms = \"soon\"").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
