//! Persistence for per-tool arguments (`get_args` / `update_args`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{app_config_path, ConfigPathError, APP_DIR};

const TOOL_ARGS_FILE: &str = "tool_args.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("tool name is empty")]
    MissingToolName,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid tool arguments json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Keyed store of JSON argument objects, one per tool name.
pub trait ToolArgsStore: Send + Sync {
    /// Stored arguments, or an empty object.
    fn load(&self, tool: &str) -> StorageResult<Value>;
    fn save(&self, tool: &str, args: &Value) -> StorageResult<()>;

    /// Merges the keys of `patch` over the stored object and returns the result.
    fn update(&self, tool: &str, patch: &Value) -> StorageResult<Value> {
        let mut merged = self.load(tool)?;
        merge_args(&mut merged, patch);
        self.save(tool, &merged)?;
        Ok(merged)
    }
}

/// Shallow merge; non-object patches replace the value outright.
pub fn merge_args(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

fn validate_tool_name(tool: &str) -> StorageResult<()> {
    if tool.is_empty() {
        return Err(StorageError::MissingToolName);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryArgsStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryArgsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolArgsStore for MemoryArgsStore {
    fn load(&self, tool: &str) -> StorageResult<Value> {
        validate_tool_name(tool)?;
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries
            .get(tool)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn save(&self, tool: &str, args: &Value) -> StorageResult<()> {
        validate_tool_name(tool)?;
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(tool.to_string(), args.clone());
        Ok(())
    }
}

/// All tools share one JSON document keyed by tool name.
#[derive(Debug)]
pub struct JsonFileArgsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileArgsStore {
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// `tool_args.json` beside `config.json`, resolved the same way.
    pub fn in_config_dir(xdg_config_home: Option<&Path>, home: Option<&Path>) -> StorageResult<Self> {
        let path = app_config_path(APP_DIR, TOOL_ARGS_FILE, xdg_config_home, home).map_err(
            |err| match err {
                ConfigPathError::MissingHomeDirectory => StorageError::MissingHomeDirectory,
            },
        )?;
        Ok(Self::with_path(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StorageResult<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Ok(Map::new()),
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "discarding unreadable tool arguments");
                Ok(Map::new())
            }
        }
    }
}

impl ToolArgsStore for JsonFileArgsStore {
    fn load(&self, tool: &str) -> StorageResult<Value> {
        validate_tool_name(tool)?;
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let document = self.read_document()?;
        Ok(document
            .get(tool)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn save(&self, tool: &str, args: &Value) -> StorageResult<()> {
        validate_tool_name(tool)?;
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut document = self.read_document()?;
        document.insert(tool.to_string(), args.clone());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&Value::Object(document))?)?;
        Ok(())
    }
}
