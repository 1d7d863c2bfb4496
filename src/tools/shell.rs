//! 命令执行工具：executeCommand
//!
//! ExecuteCommandTool 把模型的调用转交给 CommandExecutor；命令失败不算致命错误，
//! 而是写成 "The command failed with the output:\n..." 回传给模型，让它调整下一步。
//! BashExecutor 通过 `<shell> -c` 在工作目录下执行，stdout 与 stderr 按到达顺序合并捕获；
//! 超时后结束整个进程组，已捕获的输出连同超时说明一起返回。

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::core::AgentError;
use crate::tools::{decode_args, Tool};

pub const EXECUTE_COMMAND: &str = "executeCommand";

const SUCCESS_PREFIX: &str = "The command ran successfully with the output";
const FAILURE_PREFIX: &str = "The command failed with the output";

/// 一次命令执行的结果：合并后的输出与是否成功
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// 命令执行能力
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// 执行命令；启动失败也以 success = false 的结果返回
    async fn run(&self, command: &str) -> CommandOutput;
}

/// 在固定工作目录下用 bash 执行命令
#[derive(Debug, Clone)]
pub struct BashExecutor {
    shell: PathBuf,
    dir: PathBuf,
    timeout: Option<Duration>,
}

impl BashExecutor {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            shell: PathBuf::from("/usr/bin/bash"),
            dir: dir.as_ref().to_path_buf(),
            timeout: None,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // 独立进程组，超时时可一并结束子进程；stderr 指向 stdout 的同一管道，保持输出顺序
        #[cfg(unix)]
        {
            cmd.process_group(0);
            unsafe {
                cmd.pre_exec(|| {
                    if libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }
        cmd
    }
}

/// 读到 EOF 再等待退出；读取过程中已到达的输出保留在 buf 中
async fn collect(
    child: &mut Child,
    stdout: &mut ChildStdout,
    buf: &mut Vec<u8>,
) -> std::io::Result<ExitStatus> {
    stdout.read_to_end(buf).await?;
    child.wait().await
}

/// 结束 shell 及其派生的整个进程组
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[async_trait]
impl CommandExecutor for BashExecutor {
    async fn run(&self, command: &str) -> CommandOutput {
        tracing::info!(command = %command, "executing command");

        let mut cmd = self.command(command);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "command could not be started");
                return CommandOutput::failure(e.to_string());
            }
        };
        let Some(mut stdout) = child.stdout.take() else {
            kill_process_group(&mut child).await;
            return CommandOutput::failure("command output could not be captured");
        };

        let mut buf = Vec::new();
        let status = match self.timeout {
            Some(limit) => {
                let finished =
                    tokio::time::timeout(limit, collect(&mut child, &mut stdout, &mut buf)).await;
                match finished {
                    Ok(r) => r,
                    Err(_) => {
                        tracing::warn!(command = %command, timeout = ?limit, "command timed out");
                        kill_process_group(&mut child).await;
                        let partial = String::from_utf8_lossy(&buf);
                        let note = format!("Command timed out after {:?}", limit);
                        return CommandOutput::failure(if partial.is_empty() {
                            note
                        } else {
                            format!("{partial}\n{note}")
                        });
                    }
                }
            }
            None => collect(&mut child, &mut stdout, &mut buf).await,
        };

        let output = String::from_utf8_lossy(&buf).into_owned();
        match status {
            Ok(status) => CommandOutput {
                output,
                success: status.success(),
            },
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "reading command output failed");
                CommandOutput::failure(format!("{output}{e}"))
            }
        }
    }
}

#[derive(Deserialize)]
struct ExecuteCommandArgs {
    command: String,
}

/// executeCommand 工具
pub struct ExecuteCommandTool<E> {
    executor: E,
}

impl<E: CommandExecutor> ExecuteCommandTool<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

/// 按执行结果生成回传给模型的文本，不改动输出本身
pub fn format_command_result(result: &CommandOutput) -> String {
    let prefix = if result.success {
        SUCCESS_PREFIX
    } else {
        FAILURE_PREFIX
    };
    format!("{}:\n{}", prefix, result.output)
}

#[async_trait]
impl<E: CommandExecutor> Tool for ExecuteCommandTool<E> {
    fn name(&self) -> &str {
        EXECUTE_COMMAND
    }

    fn description(&self) -> &str {
        "Execute an operating system bash command"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, raw_args: &str) -> Result<String, AgentError> {
        let args: ExecuteCommandArgs = decode_args(self.name(), raw_args)?;
        let result = self.executor.run(&args.command).await;
        Ok(format_command_result(&result))
    }
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    async fn run(&self, command: &str) -> CommandOutput {
        (**self).run(command).await
    }
}
