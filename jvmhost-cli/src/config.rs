//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/jvmhost/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use jvmhost_runtime::InitOption;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Runtime discovery and creation settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Runtime discovery and creation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Explicit path to the runtime library, used verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
    /// Runtime home directory to search when no library path is given
    /// If None, `JAVA_HOME` is consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_home: Option<PathBuf>,
    /// Load the signal-chaining library before the runtime
    /// Default: true on Unix, false on Windows
    pub use_signal_library: bool,
    /// Class path entries, joined with the platform separator
    pub classpath: Vec<String>,
    /// Extra runtime options such as `-Xmx256m`
    pub options: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            java_home: None,
            use_signal_library: cfg!(unix),
            classpath: Vec::new(),
            options: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Class path as a single platform-separated string, or `None` when no
    /// entries are configured.
    pub fn classpath_string(&self) -> Result<Option<String>> {
        if self.classpath.is_empty() {
            return Ok(None);
        }
        let joined = std::env::join_paths(&self.classpath)
            .context("Class path entry contains the path separator")?;
        let joined = joined
            .into_string()
            .map_err(|_| anyhow::anyhow!("Class path is not valid UTF-8"))?;
        Ok(Some(joined))
    }

    /// Custom options in the form the runtime crate takes them
    pub fn init_options(&self) -> Vec<InitOption> {
        self.options.iter().map(InitOption::new).collect()
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/jvmhost/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "jvmhost")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    pub fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        let signal = if cfg!(unix) { "true" } else { "false" };
        format!(
            r#"# jvmhost Configuration
# This file configures how jvmhost finds and starts the Java runtime.

[runtime]
# Explicit path to the runtime library (libjvm.so, libjvm.dylib or jvm.dll).
# When set, it is used verbatim and no search is done.
# library_path = "/usr/lib/jvm/java-17-openjdk/lib/server/libjvm.so"

# Runtime home directory to search when library_path is not set.
# If not specified, the JAVA_HOME environment variable is used.
# java_home = "/usr/lib/jvm/java-17-openjdk"

# Load the signal-chaining library (libjsig) before the runtime.
use_signal_library = {signal}

# Class path entries, joined with the platform path separator.
classpath = []

# Extra runtime options, passed after the runtime's own defaults.
# options = ["-Xmx256m", "-Xss2m"]
options = []

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set.
# Default: "info"
level = "info"
"#
        )
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid logging.level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if let Some(path) = &self.runtime.library_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("runtime.library_path must not be empty");
            }
        }

        for option in &self.runtime.options {
            if option.is_empty() {
                anyhow::bail!("runtime.options must not contain empty entries");
            }
            if option.contains('\0') {
                anyhow::bail!("Runtime option contains a NUL byte: {:?}", option);
            }
        }

        for entry in &self.runtime.classpath {
            if entry.contains('\0') {
                anyhow::bail!("Class path entry contains a NUL byte: {:?}", entry);
            }
        }

        Ok(())
    }
}
