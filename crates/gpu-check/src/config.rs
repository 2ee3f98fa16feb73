use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use gpu_probe::ProbeConfig;
use utils::version;

#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    /// YAML file overriding the probe defaults
    #[arg(long, env = "GPU_CHECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Timeout for the diagnostic tool, in milliseconds
    #[arg(long, env = "GPU_CHECK_TOOL_TIMEOUT_MS", global = true)]
    pub tool_timeout_ms: Option<u64>,

    /// Log every strategy, not only the result
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Detect a GPU; exits 0 when one is available
    Check(CheckArgs),
    /// Print GPU-related environment variables that are set
    Env,
    /// List GPUs through NVML
    Devices,
}

#[derive(Args, Debug, Default, PartialEq, Eq)]
pub struct CheckArgs {
    /// Print the full probe report as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn command(&self) -> &Commands {
        const DEFAULT: Commands = Commands::Check(CheckArgs { json: false });
        self.command.as_ref().unwrap_or(&DEFAULT)
    }
}

/// Builds the probe configuration from the optional file and CLI overrides.
pub fn load_probe_config(
    path: Option<&Path>,
    tool_timeout_ms: Option<u64>,
) -> Result<ProbeConfig> {
    let mut config = match path {
        Some(path) => ProbeConfig::from_yaml_file(path)
            .with_context(|| format!("load probe config from {}", path.display()))?,
        None => ProbeConfig::default(),
    };

    if let Some(timeout) = tool_timeout_ms {
        config.tool_timeout_ms = timeout;
    }

    Ok(config)
}
