//! Environment constants and path utilities.
//!
//! Every file name, directory name and environment variable the crate looks at
//! is defined here.

use std::path::{Path, PathBuf};

/// Hidden directory holding per-project and per-user settings
pub const TASKWEAVE_DIR_NAME: &str = ".taskweave";

/// Configuration file name inside the settings directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name in a project root
pub const LOCAL_CONFIG_FILE_NAME: &str = "taskweave.toml";

/// Environment variable holding the tracing filter directive
pub const LOG_ENV_VAR: &str = "TASKWEAVE_LOG";

/// Filter used when the environment variable is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "taskweave=info";

/// File extensions accepted for task definitions
pub mod definitions {
    pub const JSON_EXTENSIONS: &[&str] = &["json"];
    pub const YAML_EXTENSIONS: &[&str] = &["yaml", "yml"];
}

/// `<dir>/taskweave.toml`
pub fn standalone_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// `<dir>/.taskweave/config.toml`
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(TASKWEAVE_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(TASKWEAVE_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}
