//! 工具箱：注册表、executeCommand、writeFile

pub mod filesystem;
pub mod registry;
pub mod shell;

pub use filesystem::{
    is_local, FileWriteError, FileWriter, SandboxFileWriter, WriteFileTool, WRITE_FILE,
};
pub use registry::{decode_args, Tool, ToolRegistry};
pub use shell::{
    format_command_result, BashExecutor, CommandExecutor, CommandOutput, ExecuteCommandTool,
    EXECUTE_COMMAND,
};

/// 内置工具集：executeCommand + writeFile
pub fn builtin_registry<E, W>(executor: E, writer: W) -> ToolRegistry
where
    E: CommandExecutor + 'static,
    W: FileWriter + 'static,
{
    let mut registry = ToolRegistry::new();
    registry.register(ExecuteCommandTool::new(executor));
    registry.register(WriteFileTool::new(writer));
    registry
}
