//! CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use mediaprobe::TestId;
use std::path::PathBuf;

/// Mediaprobe: conformance tests for media playback sessions
#[derive(Parser, Debug)]
#[command(name = "mediaprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit tracing output as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the tests available for a target
    List(ListArgs),

    /// Run one test, or every test, against a target
    Run(RunArgs),

    /// Show the current session state of a target
    State(StateArgs),
}

/// Engine settings shared by subcommands that build a catalog
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine configuration file (YAML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Evaluation timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Platform level to gate tests against
    #[arg(long, value_name = "LEVEL")]
    pub platform_level: Option<u32>,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Target profile (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,

    /// Engine settings
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Target profile (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,

    /// Run only this test id
    #[arg(short, long, value_name = "ID")]
    pub test: Option<TestId>,

    /// Query for the selected test
    #[arg(long, value_name = "QUERY", requires = "test")]
    pub query: Option<String>,

    /// Query for a test in a full run (repeatable)
    #[arg(long = "query-for", value_name = "ID=QUERY", value_parser = parse_query_override)]
    pub query_for: Vec<(TestId, String)>,

    /// Print each test's run log after its verdict
    #[arg(long)]
    pub show_log: bool,

    /// Engine settings
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the state command
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Target profile (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,
}

/// Color argument
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Output format argument
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Parse `ID=QUERY`; the query may be empty or contain `=`
fn parse_query_override(raw: &str) -> Result<(TestId, String), String> {
    let (id, query) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=QUERY, got '{raw}'"))?;
    let id = id
        .trim()
        .parse::<TestId>()
        .map_err(|_| format!("invalid test id '{id}'"))?;
    Ok((id, query.to_string()))
}
