//! Configuration loading and management.
//!
//! Reads scriptbook.toml and provides typed access to all settings. Every
//! section is optional; a missing file means all defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::executor::Interpreter;
use crate::registry::DEFAULT_REGISTRY_FILE;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "scriptbook.toml";

/// Top-level configuration from scriptbook.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    /// Registry document, relative to the directory holding scriptbook.toml.
    #[serde(default = "default_registry_path")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_registry_path() -> String {
    DEFAULT_REGISTRY_FILE.to_string()
}
fn default_interpreter() -> String {
    "osascript".to_string()
}
fn default_interpreter_args() -> Vec<String> {
    vec!["-e".to_string()]
}
fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(&self.interpreter, self.interpreter_args.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Errors that can occur during configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A loaded configuration plus the directory relative paths resolve against.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub base_dir: PathBuf,
}

impl Loaded {
    /// Absolute location of the registry document.
    pub fn registry_path(&self) -> PathBuf {
        self.base_dir.join(&self.config.registry.path)
    }
}

/// Load configuration from an explicit file.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Load `explicit` if given, otherwise the nearest scriptbook.toml at or above
/// `start`. Without any file the defaults apply, relative to `start`.
pub fn resolve(explicit: Option<&Path>, start: &Path) -> Result<Loaded, ConfigError> {
    if let Some(path) = explicit {
        let config = load_file(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf());
        return Ok(Loaded { config, base_dir });
    }

    match find_config_root(start) {
        Some(root) => Ok(Loaded {
            config: load_file(&root.join(CONFIG_FILE))?,
            base_dir: root,
        }),
        None => Ok(Loaded {
            config: Config::default(),
            base_dir: start.to_path_buf(),
        }),
    }
}

/// Find the project root by searching upward for scriptbook.toml.
pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(CONFIG_FILE).exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Parse a timeout string like "500ms", "30s", "2m" into a duration.
/// A bare number is taken as milliseconds.
pub fn parse_timeout(timeout: &str) -> Result<Duration, String> {
    let timeout = timeout.trim();
    if timeout.is_empty() {
        return Err("Empty timeout".to_string());
    }

    let split = timeout
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(timeout.len());
    let (num_str, suffix) = timeout.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in timeout: {timeout}"))?;

    match suffix {
        "" | "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num * 60)),
        _ => Err(format!("Unknown timeout suffix: {suffix}. Use ms, s, or m.")),
    }
}
