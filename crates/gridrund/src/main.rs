//! gridrund — the GridRun demo driver.
//!
//! Runs a whole deployment inside one process on the thread-based local
//! fabric, or validates a job description file.
//!
//! # Usage
//!
//! ```text
//! gridrund local --instances 3
//! gridrund local --instances 4 --description job.json
//! gridrund check job.json
//! ```
//!
//! Description files must reference the demo entry functions
//! `CoordinatorFc` and `WorkerFc`.

mod driver;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gridrun_core::DeploymentDescription;

#[derive(Parser)]
#[command(name = "gridrund", about = "GridRun demo driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a deployment on an in-process transport group.
    Local {
        /// Number of instances in the transport group.
        #[arg(long, default_value = "3")]
        instances: usize,

        /// Job description file; a built-in coordinator/worker job is
        /// used when omitted.
        #[arg(long)]
        description: Option<PathBuf>,
    },

    /// Parse and validate a job description file.
    Check {
        /// Job description file.
        description: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gridrun=debug".parse().expect("static filter")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Local {
            instances,
            description,
        } => {
            let deployment = match description {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    DeploymentDescription::from_json(&text)?.into_deployment()?
                }
                None => driver::demo_deployment(instances)?,
            };
            driver::run_local(instances, deployment)
        }
        Command::Check { description } => {
            let text = std::fs::read_to_string(&description)
                .with_context(|| format!("reading {}", description.display()))?;
            let deployment = DeploymentDescription::from_json(&text)?.into_deployment()?;
            info!(
                runners = deployment.runners.len(),
                channels = deployment.channels.len(),
                "description is valid"
            );
            for runner in &deployment.runners {
                println!("runner {:>3}  function {}", runner.id, runner.function);
            }
            for channel in &deployment.channels {
                println!(
                    "channel '{}'  producers {:?} -> consumer {}",
                    channel.name, channel.producers, channel.consumer
                );
            }
            Ok(())
        }
    }
}
