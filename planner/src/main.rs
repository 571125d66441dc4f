//! Next-best-view planner CLI.
//!
//! `planner run` reads operator commands (START, PAUSE, STOP_AND_PRINT, REINIT,
//! ABORT_LOOP, PRINT_DATA) line by line from stdin and prints the path of the
//! final planning data file on success.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use planner::core::control::ControlFlags;
use planner::core::termination::{IterationLimit, NeverTerminate, TerminationCriterion};
use planner::exit_codes;
use planner::io::commands::{command_channel, spawn_line_reader};
use planner::io::config::{DEFAULT_CONFIG_FILE, PlannerConfig, load_config, write_config};
use planner::io::service_process::{ProcessInformationService, ProcessRobotInterface};
use planner::logging;
use planner::planning::{NoViableViewError, ViewPlanner};

#[derive(Parser)]
#[command(name = "planner", version, about = "Next-best-view planning loop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Load and validate the config file.
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run the planning loop against the configured services.
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<NoViableViewError>().is_some() {
                exit_codes::NO_VIABLE_VIEW
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Validate { config } => cmd_validate(&config),
        Command::Run { config } => cmd_run(&config),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &PlannerConfig::template())?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let (_, missing) = config.utility_weights();
    if !missing.is_empty() {
        println!("metrics without weight (using 0): {}", missing.join(", "));
    }
    println!("ok");
    Ok(())
}

fn cmd_run(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    config.services.require_commands()?;
    let robot = ProcessRobotInterface::new(&config.services)?;
    let information = ProcessInformationService::new(&config.services)?;

    let termination: Box<dyn TerminationCriterion> = match config.max_iterations {
        Some(limit) => Box::new(IterationLimit(limit)),
        None => Box::new(NeverTerminate),
    };

    let (sender, inbox) = command_channel();
    // Detached: the reader blocks on stdin until EOF and must not hold up exit.
    let _stdin_reader = spawn_line_reader(BufReader::new(std::io::stdin()), sender);
    let flags = Arc::new(ControlFlags::new());

    info!(config = %path.display(), "planner ready, send START on stdin");
    let mut planner = ViewPlanner::new(robot, information, termination, &config, flags, inbox);
    let outcome = planner.run()?;
    info!(iterations = outcome.iterations, stop = ?outcome.stop, "planner finished");
    println!("{}", outcome.data_file.display());
    Ok(())
}
