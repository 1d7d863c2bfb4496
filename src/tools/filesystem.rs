//! 沙箱文件写入：writeFile
//!
//! SandboxFileWriter 绑定 root_dir，只接受「本地路径」（非空、非绝对、不通过 ../ 逃逸出根目录），
//! 自动创建中间目录（0700）后写入（新文件 0600）。WriteFileTool 把写入失败视为基础设施故障，返回致命的 ToolExecution。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::core::AgentError;
use crate::tools::{decode_args, Tool};

pub const WRITE_FILE: &str = "writeFile";

/// 新建目录与文件只对当前用户开放
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// 写文件失败原因
#[derive(Error, Debug)]
pub enum FileWriteError {
    #[error("path is not a local path: {0:?}")]
    NotLocal(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// 文件写入能力
#[async_trait]
pub trait FileWriter: Send + Sync {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FileWriteError>;
}

#[async_trait]
impl<T: FileWriter + ?Sized> FileWriter for std::sync::Arc<T> {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FileWriteError> {
        (**self).write_file(path, content).await
    }
}

/// 纯词法判断：非空、非绝对路径，且任何前缀都不会通过 `..` 回到根目录之外
pub fn is_local(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let mut depth: usize = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return false,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::Normal(_) => depth += 1,
        }
    }
    true
}

/// 沙箱写入器：所有路径相对 root_dir 解析
#[derive(Debug, Clone)]
pub struct SandboxFileWriter {
    root_dir: PathBuf,
}

impl SandboxFileWriter {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// 校验并解析为根目录下的完整路径
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FileWriteError> {
        if !is_local(path) {
            return Err(FileWriteError::NotLocal(path.to_string()));
        }
        Ok(self.root_dir.join(path))
    }
}

#[async_trait]
impl FileWriter for SandboxFileWriter {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FileWriteError> {
        tracing::info!(path = %path, "writing file");
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            let mut dirs = tokio::fs::DirBuilder::new();
            dirs.recursive(true);
            #[cfg(unix)]
            dirs.mode(DIR_MODE);
            dirs.create(parent).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);
        let mut file = options.open(&full).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

/// writeFile 工具：成功时结果固定为 "ok"
pub struct WriteFileTool<W> {
    writer: W,
}

impl<W: FileWriter> WriteFileTool<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W: FileWriter> Tool for WriteFileTool<W> {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write a file to the filesystem"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The content of the file as a string"
                },
                "path": {
                    "type": "string",
                    "description": "The relative path of the file within the project"
                }
            },
            "required": ["content", "path"]
        })
    }

    async fn execute(&self, raw_args: &str) -> Result<String, AgentError> {
        let args: WriteFileArgs = decode_args(self.name(), raw_args)?;
        self.writer
            .write_file(&args.path, &args.content)
            .await
            .map_err(|e| AgentError::ToolExecution {
                tool: self.name().to_string(),
                cause: e.to_string(),
            })?;
        Ok("ok".to_string())
    }
}
