//! Mediaprobe CLI: conformance tests for media playback sessions
//!
//! ## Usage
//!
//! ```bash
//! mediaprobe list --profile player.yaml              # Show the catalog
//! mediaprobe run --profile player.yaml               # Run every test
//! mediaprobe run -p player.yaml --test 9 --query +15 # Seek forward 15s
//! mediaprobe state --profile player.yaml             # Show session state
//! ```

use clap::Parser;
use mediaprobe_cli::{Cli, CliConfig, CliError, CliResult, Commands, ProbeRunner, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli);
    init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Io)?;
    let runner = ProbeRunner::new(config);

    match &cli.command {
        Commands::List(args) => runner.list(args),
        Commands::Run(args) => runtime.block_on(runner.run(args)),
        Commands::State(args) => runtime.block_on(runner.state(args)),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(cli.color.into())
        .with_log_json(cli.log_json)
}

/// Install the tracing subscriber; `RUST_LOG` wins over verbosity flags
fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.default_filter()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(config.color.should_color())
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
