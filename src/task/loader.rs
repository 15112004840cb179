//! Task definition files
//!
//! A definition file is JSON or YAML (chosen by extension) and holds one of:
//! - a single task definition
//! - a list of task definitions
//! - a document with a top-level `tasks` list

use crate::env::definitions::{JSON_EXTENSIONS, YAML_EXTENSIONS};
use crate::task::types::{TaskError, TaskSpec};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("File '{path}' not found")]
    NotFound { path: PathBuf },

    #[error("File '{path}' is not UTF-8 encoded")]
    NotUtf8 { path: PathBuf },

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unsupported definition format for '{path}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Invalid(#[from] TaskError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if JSON_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Json)
        } else if YAML_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Yaml)
        } else {
            None
        }
    }
}

/// Reads task definitions from disk
pub struct TaskLoader;

impl TaskLoader {
    /// Load and validate every definition in a file
    pub fn load_specs<P: AsRef<Path>>(path: P) -> Result<Vec<TaskSpec>, DefinitionError> {
        let path = path.as_ref();
        let format = DefinitionFormat::from_path(path).ok_or_else(|| {
            DefinitionError::UnsupportedFormat {
                path: path.to_path_buf(),
            }
        })?;
        let content = Self::load_utf8_file(path)?;
        let specs = Self::parse_specs(&content, format)?;

        debug!("Loaded {} task definitions from {:?}", specs.len(), path);
        Ok(specs)
    }

    /// Parse definitions from text in the given format
    pub fn parse_specs(content: &str, format: DefinitionFormat) -> Result<Vec<TaskSpec>, DefinitionError> {
        let document: Value = match format {
            DefinitionFormat::Json => {
                serde_json::from_str(content).map_err(|e| DefinitionError::Parse(e.to_string()))?
            }
            DefinitionFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| DefinitionError::Parse(e.to_string()))?
            }
        };

        let entries = match document {
            Value::Array(entries) => entries,
            Value::Object(mut map) if map.contains_key("tasks") => match map.remove("tasks") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(DefinitionError::Parse(
                        "'tasks' must be a list of task definitions".to_string(),
                    ));
                }
            },
            single @ Value::Object(_) => vec![single],
            other => {
                return Err(DefinitionError::Parse(format!(
                    "expected a task definition or a list, found {}",
                    other
                )));
            }
        };

        let mut specs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let spec: TaskSpec = serde_json::from_value(entry)
                .map_err(|e| DefinitionError::Parse(format!("definition {}: {}", index, e)))?;
            spec.validate()?;
            specs.push(spec);
        }
        Ok(specs)
    }

    fn load_utf8_file(path: &Path) -> Result<String, DefinitionError> {
        debug!("Loading definition file: {:?}", path);

        fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DefinitionError::NotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::InvalidData => DefinitionError::NotUtf8 {
                path: path.to_path_buf(),
            },
            _ => DefinitionError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }
}
