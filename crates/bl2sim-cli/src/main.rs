//! BL2 simulation command-line interface.
//!
//! Replay recorded events through the BL2 station geometry:
//! ```sh
//! bl2sim run job.toml                 # batch, [run].beam_on events
//! bl2sim run job.toml -m run.mac      # batch macro
//! bl2sim run job.toml -u tcsh         # interactive prompt
//! bl2sim validate job.toml
//! bl2sim geometry job.toml
//! ```

mod config;
mod replay;
mod session;

use std::path::PathBuf;

use anyhow::Context;
use bl2sim_core::command::Command;
use clap::{Parser, Subcommand};

use crate::replay::ReplayEngine;
use crate::session::{build_manager, Session};

#[derive(Parser)]
#[command(name = "bl2sim")]
#[command(about = "BL2 solid-target station simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job, in batch or interactively.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Macro file to execute.
        #[arg(short, long = "macro")]
        macro_file: Option<PathBuf>,
        /// Open an interactive session after the macro, if any.
        #[arg(short = 'u', long)]
        session: Option<String>,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and build its geometry without
    /// running events.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the volume tree of a job's geometry.
    Geometry {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            macro_file,
            session,
            output,
        } => {
            println!("BL2 Simulation");
            println!("==============");
            let mut job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            if let Some(dir) = output {
                job.output.directory = dir;
            }

            let manager = build_manager(&job)?;
            let engine = ReplayEngine::open(&job.run.events)?;
            if engine.is_empty() {
                log::warn!("event file '{}' holds no events", job.run.events.display());
            }
            let all_events = engine.len() as u64;
            let mut runner = Session::new(manager, engine);

            if let Some(path) = &macro_file {
                runner.run_macro(path)?;
            }
            if let Some(name) = &session {
                log::info!("interactive session '{}'", name);
                let stdin = std::io::stdin();
                runner.interactive(stdin.lock(), std::io::stdout())?;
            }
            if macro_file.is_none() && session.is_none() {
                let events = job.run.beam_on.unwrap_or(all_events);
                runner.execute(Command::BeamOn(events))?;
            }

            if !runner.manager().is_initialized() {
                log::warn!("session ended before the geometry was built");
            }
            println!("Simulation complete: {} run(s).", runner.runs().len());
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let mut manager = build_manager(&job)?;
            manager
                .initialize()
                .with_context(|| format!("Geometry of '{}' does not build", config.display()))?;
            ReplayEngine::open(&job.run.events)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Geometry { config } => {
            let job = config::load_config(&config)?;
            let mut manager = build_manager(&job)?;
            manager.initialize()?;

            println!("Modules:");
            for name in manager.registry().names() {
                let envelope = match manager.registry().envelope(name) {
                    Some(_) => "envelope",
                    None => "no envelope",
                };
                println!("  {:<20} {}", name, envelope);
            }
            println!();
            print!("{}", manager.volumes().summary());
            Ok(())
        }
    }
}
