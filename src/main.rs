//! Shot Sensing CLI
//!
//! ## Usage
//!
//! ```bash
//! shot-sensing replay session.jsonl                # Replay a recorded trace
//! shot-sensing replay session.jsonl --config c.json --round-size 10
//! shot-sensing defaults                            # Print the default config
//! ```
//!
//! Events are written to stdout as JSON lines; logs go to stderr and follow
//! `RUST_LOG`.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shot_sensing::config::DetectorConfig;
use shot_sensing::error::ReplayError;
use shot_sensing::replay::{load_trace, Replayer};
use shot_sensing::round::{Round, DEFAULT_TARGET_COUNT};

/// Offline tools for the clay-target shot detector
#[derive(Parser, Debug)]
#[command(name = "shot-sensing")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded JSON-lines sensor trace
    Replay(ReplayArgs),

    /// Print the default detector configuration as JSON
    Defaults,
}

#[derive(clap::Args, Debug)]
struct ReplayArgs {
    /// Trace file, one JSON record per line
    trace: PathBuf,

    /// Detector configuration file (JSON, partial overrides allowed)
    #[arg(short, long, env = "SHOT_SENSING_CONFIG")]
    config: Option<PathBuf>,

    /// Number of targets in the round
    #[arg(long, default_value_t = DEFAULT_TARGET_COUNT)]
    round_size: usize,

    /// Shooter name recorded on the scorecard
    #[arg(long, default_value = "shooter")]
    shooter: String,

    /// Only print the round summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), ReplayError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(args) => run_replay(&args),
        Commands::Defaults => {
            let json = serde_json::to_string_pretty(&DetectorConfig::default())
                .map_err(|e| ReplayError::Output(e.into()))?;
            println!("{json}");
            Ok(())
        }
    }
}

fn run_replay(args: &ReplayArgs) -> Result<(), ReplayError> {
    let config = match &args.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::default(),
    };
    let round = Round::new(args.shooter.clone(), args.round_size)?;
    let records = load_trace(&args.trace)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut replayer = Replayer::new(config, round)?;
    for record in &records {
        for event in replayer.apply(record) {
            if args.quiet {
                continue;
            }
            let line = serde_json::to_string(&event).map_err(|e| ReplayError::Output(e.into()))?;
            writeln!(out, "{line}").map_err(ReplayError::Output)?;
        }
    }

    let report = replayer.finish();
    let tally = report.round.tally();
    writeln!(
        out,
        "{}: {}/{} (first shot {}, second shot {}, missed {}, {} targets left)",
        report.round.shooter(),
        report.round.score(),
        report.round.results().len(),
        tally.hit_first_shot,
        tally.hit_second_shot,
        tally.miss,
        report.round.remaining(),
    )
    .map_err(ReplayError::Output)?;
    if report.unscored > 0 {
        writeln!(out, "{} outcomes after the round was complete", report.unscored)
            .map_err(ReplayError::Output)?;
    }
    Ok(())
}
