//! Operator commands: discovery report and create/destroy probe.

use anyhow::{Context, Result};
use clap::Args;
use jvmhost_runtime::os::{self, OsHandler};
use jvmhost_runtime::{JvmLibrary, RuntimeLibraryPathInfo, Vm};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RuntimeConfig;

/// Command-line overrides for the `[runtime]` configuration section.
#[derive(Debug, Clone, Default, Args)]
pub struct RuntimeArgs {
    /// Explicit runtime library path
    #[arg(long = "jvm", global = true)]
    pub library_path: Option<PathBuf>,
    /// Runtime home directory to search
    #[arg(long, global = true)]
    pub java_home: Option<PathBuf>,
    /// Class path entry; replaces the configured class path (repeatable)
    #[arg(long = "classpath", global = true)]
    pub classpath: Vec<String>,
    /// Extra runtime option, appended to the configured ones (repeatable)
    #[arg(long = "option", global = true, allow_hyphen_values = true)]
    pub options: Vec<String>,
    /// Do not load the signal-chaining library
    #[arg(long, global = true)]
    pub no_signal_library: bool,
}

impl RuntimeArgs {
    /// Apply the overrides on top of `config`.
    pub fn apply(&self, config: &mut RuntimeConfig) {
        if let Some(path) = &self.library_path {
            config.library_path = Some(path.clone());
        }
        if let Some(home) = &self.java_home {
            config.java_home = Some(home.clone());
        }
        if !self.classpath.is_empty() {
            config.classpath = self.classpath.clone();
        }
        config.options.extend(self.options.iter().cloned());
        if self.no_signal_library {
            config.use_signal_library = false;
        }
    }
}

/// Result of `jvmhost discover`.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    #[serde(flatten)]
    pub paths: RuntimeLibraryPathInfo,
    pub runtime_library_exists: bool,
    pub signal_library_exists: bool,
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.paths.runtime_home {
            Some(home) => writeln!(f, "Runtime home:    {}", home.display())?,
            None => writeln!(f, "Runtime home:    (none)")?,
        }
        writeln!(
            f,
            "Runtime library: {}{}",
            self.paths.runtime_library_path.display(),
            missing_marker(self.runtime_library_exists)
        )?;
        writeln!(
            f,
            "Signal library:  {}{}",
            self.paths.signal_library_path.display(),
            missing_marker(self.signal_library_exists)
        )
    }
}

fn missing_marker(exists: bool) -> &'static str {
    if exists {
        ""
    } else {
        " (not found on disk)"
    }
}

/// Resolve the runtime library paths without loading anything.
pub fn discover(config: &RuntimeConfig, os: &dyn OsHandler) -> DiscoveryReport {
    let paths = os.find_runtime_library(config.library_path.as_deref(), config.java_home.as_deref());
    DiscoveryReport {
        runtime_library_exists: paths.runtime_library_path.is_file(),
        signal_library_exists: paths.signal_library_path.is_file(),
        paths,
    }
}

/// Result of `jvmhost probe`.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub runtime_library_path: Option<PathBuf>,
    pub fully_resolved: bool,
    pub option_count: usize,
    pub created_runtimes: usize,
    pub dumped_stacks: bool,
}

/// Load the runtime library, then create and destroy one runtime.
pub fn probe(config: &RuntimeConfig, dump_stacks: bool) -> Result<ProbeReport> {
    let mut library = JvmLibrary::new(os::create());
    let paths = library
        .discover_and_load(
            config.library_path.as_deref(),
            config.java_home.as_deref(),
            config.use_signal_library,
        )
        .context("Failed to load the runtime library")?;
    info!("Runtime library: {}", paths.runtime_library_path.display());

    probe_library(Arc::new(library), config, dump_stacks)
}

/// Create and destroy one runtime through an already loaded library.
pub fn probe_library(
    library: Arc<JvmLibrary>,
    config: &RuntimeConfig,
    dump_stacks: bool,
) -> Result<ProbeReport> {
    let fully_resolved = library.is_fully_resolved();
    if !fully_resolved {
        warn!("Runtime library does not export every entry point");
    }

    let classpath = config.classpath_string()?;
    let options = config.init_options();

    let mut vm = Vm::new(library.clone());
    vm.init(classpath.as_deref(), Some(options.as_slice()), None)
        .context("Failed to create the runtime")?;

    let created_runtimes = library
        .created_vms()
        .context("Failed to enumerate created runtimes")?
        .len();

    if dump_stacks {
        vm.dump_all_stacks().context("Failed to dump stacks")?;
    }

    vm.destroy().context("Failed to destroy the runtime")?;

    Ok(ProbeReport {
        runtime_library_path: library.jvm_path().map(|p| p.to_path_buf()),
        fully_resolved,
        option_count: options.len(),
        created_runtimes,
        dumped_stacks: dump_stacks,
    })
}
