//! File system operations scoped to the agent's working directory

use agentry_context::{ambient, FileSystemHandle};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use super::path_utils::resolve_in_workspace;
use super::{Args, FunctionClass};
use crate::FunctionError;

#[derive(Debug, Default)]
pub struct FileSystemFunctions;

impl FileSystemFunctions {
    pub fn new() -> Self {
        Self
    }

    fn handle() -> Result<FileSystemHandle, FunctionError> {
        Ok(ambient::with_current(|ctx| ctx.file_system.clone())?)
    }

    async fn resolve(path: &str) -> Result<PathBuf, FunctionError> {
        let handle = Self::handle()?;
        resolve_in_workspace(path, &handle.working_directory, &handle.base_path).await
    }

    async fn read_file(args: Args) -> Result<Value, FunctionError> {
        let raw = args.string(0, "path")?;
        let path = Self::resolve(&raw).await?;
        debug!("reading {:?}", path);

        if !path.is_file() {
            return Err(FunctionError::Failed(format!("no such file: {}", raw)));
        }
        Ok(json!(tokio::fs::read_to_string(&path).await?))
    }

    async fn write_file(args: Args) -> Result<Value, FunctionError> {
        let raw = args.string(0, "path")?;
        let content = args.string(1, "content")?;
        let path = Self::resolve(&raw).await?;
        debug!("writing {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        Ok(json!(format!("wrote {} bytes to {}", content.len(), raw)))
    }

    async fn edit_file(args: Args) -> Result<Value, FunctionError> {
        let raw = args.string(0, "path")?;
        let old_text = args.string(1, "oldText")?;
        let new_text = args.string(2, "newText")?;
        let path = Self::resolve(&raw).await?;

        if !path.is_file() {
            return Err(FunctionError::Failed(format!("no such file: {}", raw)));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        match content.matches(&old_text).count() {
            0 => Err(FunctionError::Failed(format!("text not found in {}", raw))),
            1 => {
                tokio::fs::write(&path, content.replacen(&old_text, &new_text, 1)).await?;
                Ok(json!(format!("edited {}", raw)))
            }
            n => Err(FunctionError::Failed(format!(
                "text is ambiguous in {}: {} matches",
                raw, n
            ))),
        }
    }

    async fn list_directory(args: Args) -> Result<Value, FunctionError> {
        let raw = args.optional_string(0).unwrap_or_else(|| ".".to_string());
        let path = Self::resolve(&raw).await?;

        if !path.is_dir() {
            return Err(FunctionError::Failed(format!("not a directory: {}", raw)));
        }
        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            items.push(name);
        }
        items.sort();
        Ok(json!(items))
    }

    async fn set_working_directory(args: Args) -> Result<Value, FunctionError> {
        let raw = args.string(0, "dir")?;
        let path = Self::resolve(&raw).await?;
        if !path.is_dir() {
            return Err(FunctionError::Failed(format!("not a directory: {}", raw)));
        }

        let display = path.display().to_string();
        ambient::with_current(|ctx| {
            ctx.file_system.working_directory = path;
            ctx.touch();
        })?;
        Ok(json!(display))
    }
}

#[async_trait]
impl FunctionClass for FileSystemFunctions {
    fn name(&self) -> &str {
        "FileSystem"
    }

    fn methods(&self) -> &[&'static str] {
        &[
            "getWorkingDirectory",
            "setWorkingDirectory",
            "readFile",
            "writeFile",
            "editFile",
            "listDirectory",
        ]
    }

    fn metadata(&self) -> &'static str {
        include_str!("../../metadata/filesystem.json")
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        match method {
            "getWorkingDirectory" => Ok(json!(Self::handle()?
                .working_directory
                .display()
                .to_string())),
            "setWorkingDirectory" => {
                Self::set_working_directory(Args::new("setWorkingDirectory", args)).await
            }
            "readFile" => Self::read_file(Args::new("readFile", args)).await,
            "writeFile" => Self::write_file(Args::new("writeFile", args)).await,
            "editFile" => Self::edit_file(Args::new("editFile", args)).await,
            "listDirectory" => Self::list_directory(Args::new("listDirectory", args)).await,
            other => Err(FunctionError::UnknownMethod {
                class: "FileSystem".to_string(),
                method: other.to_string(),
            }),
        }
    }
}
