//! physnet CLI - dry-run driver for the physical network manager.
//!
//! `replay` loads a TOML plan, wires every declared network to a recording kernel and applies
//! the plan's steps in order. Nothing touches the host routing tables; the output is the
//! sequence of kernel-facing calls each step would have made and the resulting state.
//!
//! ```text
//! main() -> Config::load -> init_tracing -> Plan::load -> replay() -> Report::render | JSON
//! ```

mod plan;
mod replay;

use std::io::stderr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use physnet_config::Config;
use physnet_types::{LogFilter, SubPriority};

use crate::plan::Plan;

#[derive(Parser)]
#[command(name = "physnet")]
#[command(about = "Replay physical network operations against a recording kernel")]
struct Cli {
    /// Config file (default: ~/.physnet/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a plan and print every recorded kernel call
    Replay {
        plan: PathBuf,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report whether a UID-range sub-priority is accepted
    CheckSubPriority {
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },
}

fn init_tracing(configured: Option<&LogFilter>) {
    let fallback = configured.map_or("info", LogFilter::as_str);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(config.log_filter());
    if let Some(path) = config.source() {
        tracing::debug!(path = %path.display(), "Loaded config");
    }

    match cli.command {
        Command::Replay { plan, json } => {
            let plan = Plan::load(&plan)?;
            let report = replay::replay(&plan, config.settings())?;
            if json {
                let out = serde_json::to_string_pretty(&report).context("failed to encode report")?;
                println!("{out}");
            } else {
                print!("{}", report.render());
            }
            tracing::info!(
                steps = report.steps.len(),
                failed = report.failures(),
                "Replay finished"
            );
            if report.failures() > 0 {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckSubPriority { value } => match SubPriority::new(value) {
            Ok(sub_priority) if sub_priority.is_no_default() => {
                println!("{value}: valid (no-default sentinel)");
                Ok(ExitCode::SUCCESS)
            }
            Ok(_) => {
                println!("{value}: valid");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                println!("{value}: {err}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
