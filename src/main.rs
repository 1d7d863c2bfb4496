//! Minimalprompt 入口
//!
//! 读取系统提示词与初始提示词文件，以输出目录作为命令工作目录与写文件的沙箱根，运行 Agent 主循环。
//! Ctrl-C 在当前轮结束后取消运行，再次 Ctrl-C 立即以 130 退出；出现致命错误时打印原因并以状态码 1 退出。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use minimalprompt::config::load_config;
use minimalprompt::llm::AnthropicClient;
use minimalprompt::observability;
use minimalprompt::react::{AgentLoop, TerminalPrompter};
use minimalprompt::tools::{builtin_registry, BashExecutor, SandboxFileWriter};
use tokio_util::sync::CancellationToken;

/// Minimalprompt invokes a LLM to manipulate an output directory.
#[derive(Parser, Debug)]
#[command(
    name = "minimalprompt",
    version,
    after_long_help = "WARNING: It dangerously provides the LLM access to write files and run \
commands. Any usage is at your own risk.\n\nIt will prompt the user if the LLM will not proceed \
without a prompt. Send an EOF (CTRL-D) to end the prompt message."
)]
struct Cli {
    /// 配置文件（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 系统提示词文件
    system_prompt: PathBuf,

    /// 初始提示词文件
    initial_prompt: PathBuf,

    /// 输出目录：命令工作目录与写文件的沙箱根
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    observability::init();

    if let Err(e) = run(Cli::parse()).await {
        let err = format!("{e:#}");
        tracing::error!(err = %err, "running agent");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.clone()).context("Failed to load config")?;

    let persona = std::fs::read_to_string(&cli.system_prompt)
        .with_context(|| format!("reading system prompt {}", cli.system_prompt.display()))?;
    let prompt = std::fs::read_to_string(&cli.initial_prompt)
        .with_context(|| format!("reading initial prompt {}", cli.initial_prompt.display()))?;

    if config.llm.provider != "anthropic" {
        anyhow::bail!("unsupported LLM provider: {}", config.llm.provider);
    }
    let llm = AnthropicClient::new(&config.llm).context("initializing model")?;
    tracing::info!(model = %llm.model(), dir = %cli.output_dir.display(), "starting agent");

    let executor = BashExecutor::new(&cli.output_dir)
        .with_shell(config.tools.shell.clone())
        .with_timeout(config.tools.command_timeout());
    let writer = SandboxFileWriter::new(&cli.output_dir);

    let agent = AgentLoop::new(
        Arc::new(llm),
        builtin_registry(executor, writer),
        Arc::new(TerminalPrompter::stdio()),
        persona,
        prompt,
    )
    .with_cycle_delay(config.agent.cycle_delay());

    let cancel = CancellationToken::new();
    let interrupts = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, interrupts).await {
            tracing::warn!("second interrupt received, exiting immediately");
            std::process::exit(130);
        }
    });

    agent.run(cancel).await?;
    Ok(())
}

/// 第一次中断取消运行；第二次中断返回 true，由调用方强制退出。无法监听信号时返回 false
async fn watch_interrupts<S, F>(mut next_interrupt: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    let mut interrupted = false;
    loop {
        if let Err(e) = next_interrupt().await {
            tracing::warn!(error = %e, "listening for interrupts failed");
            return false;
        }
        if interrupted {
            return true;
        }
        interrupted = true;
        tracing::info!("interrupt received, stopping after current cycle");
        cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_forces_exit() {
        let cancel = CancellationToken::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let token = cancel.clone();

        let force_exit = watch_interrupts(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let token = token.clone();
                async move {
                    if n == 1 {
                        // 第二次中断前第一次已生效
                        assert!(token.is_cancelled());
                    }
                    Ok(())
                }
            },
            cancel.clone(),
        )
        .await;

        assert!(force_exit);
        assert!(cancel.is_cancelled());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_signal_listener_failure_does_not_force_exit() {
        let cancel = CancellationToken::new();
        let force_exit = watch_interrupts(
            || async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no signals")) },
            cancel.clone(),
        )
        .await;
        assert!(!force_exit);
        assert!(!cancel.is_cancelled());
    }
}
