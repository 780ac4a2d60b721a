use clap::{Parser, Subcommand};
use log::error;
use std::process::ExitCode;

use timetable_solver::data::{SolverOptions, TimetableInput};
use timetable_solver::{server, solver};

/// Weekly class timetable solver.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Add FREE periods and allow slots to stay empty.
    #[arg(long)]
    free_periods: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the solver over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve { bind }) => match server::run_server(&bind).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server error: {}", e);
                ExitCode::FAILURE
            }
        },
        None => solve_default(cli.free_periods).await,
    }
}

async fn solve_default(free_periods: bool) -> ExitCode {
    let input = TimetableInput::default_catalog(free_periods);
    let result = tokio::task::spawn_blocking(move || {
        solver::solve(&input, &SolverOptions::default())
    })
    .await;

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Solver task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if output.is_solved() {
        ExitCode::SUCCESS
    } else {
        eprintln!("No timetable found ({:?})", output.status);
        ExitCode::FAILURE
    }
}
