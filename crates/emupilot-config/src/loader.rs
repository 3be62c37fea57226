// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, PilotConfig, VisualMode};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "emupilot.toml";

/// Source of configuration consumed by the engine
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> ConfigResult<PilotConfig>;
}

/// Configuration store backed by a TOML file plus overrides
#[derive(Debug, Clone, Default)]
pub struct FileConfigStore {
    path: Option<PathBuf>,
    cli_args: HashMap<String, String>,
}

impl FileConfigStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            cli_args: HashMap::new(),
        }
    }

    pub fn with_cli_args(mut self, cli_args: HashMap<String, String>) -> Self {
        self.cli_args = cli_args;
        self
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ConfigResult<PilotConfig> {
        load_config(self.path.as_deref(), Some(&self.cli_args))
    }
}

/// Find the emupilot configuration file
///
/// Search order:
/// 1. `EMUPILOT_CONFIG_PATH` environment variable
/// 2. Current working directory: `./emupilot.toml`
/// 3. Parent directories (searches up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("EMUPILOT_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by EMUPILOT_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "configuration file '{}' not found in any of these locations:\n{}\n\nSet EMUPILOT_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML.
/// Validation is a separate step, see [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<PilotConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: PilotConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn parse_visual_mode(value: &str) -> Option<VisualMode> {
    match value.to_lowercase().as_str() {
        "clip" => Some(VisualMode::Clip),
        "screenshot" => Some(VisualMode::Screenshot),
        _ => None,
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `EMUPILOT_IPC_HOST` -> `ipc.host`
/// - `EMUPILOT_IPC_PORT` -> `ipc.port`
/// - `EMUPILOT_EMULATOR_HOST` -> `emulator.host`
/// - `EMUPILOT_EMULATOR_PORT` -> `emulator.port`
/// - `EMUPILOT_CAPTURE_FPS` -> `capture.target_fps`
/// - `EMUPILOT_FRAME_SOURCE` -> `capture.frame_source_path`
/// - `EMUPILOT_COOLDOWN_MS` -> `timing.cooldown_ms`
/// - `EMUPILOT_VISUAL_MODE` -> `decision.visual_mode`
/// - `EMUPILOT_ORACLE_ENDPOINT` -> `decision.oracle_endpoint`
/// - `EMUPILOT_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut PilotConfig) {
    if let Ok(value) = env::var("EMUPILOT_IPC_HOST") {
        config.ipc.host = value;
    }
    if let Ok(value) = env::var("EMUPILOT_IPC_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.ipc.port = port;
        }
    }
    if let Ok(value) = env::var("EMUPILOT_EMULATOR_HOST") {
        config.emulator.host = value;
    }
    if let Ok(value) = env::var("EMUPILOT_EMULATOR_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.emulator.port = port;
        }
    }
    if let Ok(value) = env::var("EMUPILOT_CAPTURE_FPS") {
        if let Ok(fps) = value.parse::<f64>() {
            config.capture.target_fps = fps;
        }
    }
    if let Ok(value) = env::var("EMUPILOT_FRAME_SOURCE") {
        config.capture.frame_source_path = PathBuf::from(value);
    }
    if let Ok(value) = env::var("EMUPILOT_COOLDOWN_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timing.cooldown_ms = ms;
        }
    }
    if let Ok(value) = env::var("EMUPILOT_VISUAL_MODE") {
        if let Some(mode) = parse_visual_mode(&value) {
            config.decision.visual_mode = mode;
        }
    }
    if let Ok(value) = env::var("EMUPILOT_ORACLE_ENDPOINT") {
        config.decision.oracle_endpoint = value;
    }
    if let Ok(value) = env::var("EMUPILOT_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"ipc_port": "9000", "visual_mode": "screenshot"}`)
pub fn apply_cli_overrides(config: &mut PilotConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("ipc_host") {
        config.ipc.host = value.clone();
    }
    if let Some(value) = cli_args.get("ipc_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.ipc.port = port;
        }
    }
    if let Some(value) = cli_args.get("emulator_host") {
        config.emulator.host = value.clone();
    }
    if let Some(value) = cli_args.get("emulator_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.emulator.port = port;
        }
    }
    if let Some(value) = cli_args.get("capture_fps") {
        if let Ok(fps) = value.parse::<f64>() {
            config.capture.target_fps = fps;
        }
    }
    if let Some(value) = cli_args.get("cooldown_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timing.cooldown_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("visual_mode") {
        if let Some(mode) = parse_visual_mode(value) {
            config.decision.visual_mode = mode;
        }
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("EMUPILOT_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("EMUPILOT_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("EMUPILOT_CONFIG_PATH", "/nonexistent/emupilot.toml");
        let result = find_config_file();
        env::remove_var("EMUPILOT_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("EMUPILOT_IPC_PORT");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[capture]").unwrap();
        writeln!(file, "window_secs = 12.0").unwrap();
        writeln!(file, "[ipc]").unwrap();
        writeln!(file, "port = 9100").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.capture.window_secs, 12.0);
        assert_eq!(config.ipc.port, 9100);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[capture\nwindow_secs = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = PilotConfig::default();

        env::set_var("EMUPILOT_EMULATOR_PORT", "9999");
        env::set_var("EMUPILOT_VISUAL_MODE", "Screenshot");

        apply_environment_overrides(&mut config);

        env::remove_var("EMUPILOT_EMULATOR_PORT");
        env::remove_var("EMUPILOT_VISUAL_MODE");

        assert_eq!(config.emulator.port, 9999);
        assert_eq!(config.decision.visual_mode, VisualMode::Screenshot);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        // CLI overrides take precedence over environment variables
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[timing]").unwrap();
        writeln!(file, "cooldown_ms = 100").unwrap();
        writeln!(file, "[ipc]").unwrap();
        writeln!(file, "port = 9000").unwrap();

        env::set_var("EMUPILOT_COOLDOWN_MS", "2000");
        env::set_var("EMUPILOT_IPC_PORT", "9001");

        let mut cli_args = HashMap::new();
        cli_args.insert("cooldown_ms".to_string(), "3000".to_string());

        let store = FileConfigStore::new(Some(config_path)).with_cli_args(cli_args);
        let config = store.load().unwrap();

        env::remove_var("EMUPILOT_COOLDOWN_MS");
        env::remove_var("EMUPILOT_IPC_PORT");

        assert_eq!(config.timing.cooldown_ms, 3000);
        assert_eq!(config.ipc.port, 9001);
    }
}
