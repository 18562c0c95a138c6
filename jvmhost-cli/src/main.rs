//! # jvmhost
//!
//! Locates, loads and probes an embedded Java runtime.
//!
//! ## Configuration
//!
//! Settings are read from `$XDG_CONFIG_HOME/jvmhost/config.toml` (created
//! with defaults on first run) or from `--config`. Runtime flags override
//! the file.
//!
//! ## Running
//!
//! ```bash
//! # Show where the runtime library would be loaded from
//! jvmhost discover
//!
//! # Create and destroy a runtime with an extra option
//! jvmhost probe --option -Xmx64m
//!
//! # With debug logging
//! RUST_LOG=debug jvmhost probe --dump-stacks
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jvmhost_cli::commands::{self, RuntimeArgs};
use jvmhost_cli::config::Config;
use jvmhost_runtime::os;

#[derive(Debug, Parser)]
#[command(name = "jvmhost")]
#[command(about = "Locate, load and probe an embedded Java runtime")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/jvmhost/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve the runtime and signal library paths.
    Discover {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load the runtime library, create a runtime and destroy it again.
    Probe {
        /// Print every runtime thread's stack before destroying.
        #[arg(long)]
        dump_stacks: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config.logging.level);
    info!("Starting jvmhost v{}", env!("CARGO_PKG_VERSION"));

    cli.runtime.apply(&mut config.runtime);

    match cli.command {
        Command::Discover { json } => {
            let os = os::create();
            let report = commands::discover(&config.runtime, os.as_ref());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
        Command::Probe { dump_stacks } => {
            let report = commands::probe(&config.runtime, dump_stacks)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
