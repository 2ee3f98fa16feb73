mod cmd;
mod config;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use utils::logging;
use utils::version;

use crate::config::Cli;
use crate::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<ExitCode> {
    setup_global_hooks();

    let cli = Cli::parse();

    logging::init_with_default(if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    });
    tracing::debug!("gpu-check {}", &**version::VERSION);

    let config = config::load_probe_config(cli.config.as_deref(), cli.tool_timeout_ms)?;

    match cli.command() {
        Commands::Check(args) => cmd::check::run(config, args),
        Commands::Env => {
            cmd::env::run(config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Devices => cmd::devices::run().map(|()| ExitCode::SUCCESS),
    }
}
