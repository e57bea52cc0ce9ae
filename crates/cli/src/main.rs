// convmatch CLI - config-driven daily batch reconciliation

mod exit_codes;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "convmatch")]
#[command(about = "Match marketing conversions against broker visit logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline from a TOML config file
    #[command(after_help = "\
Examples:
  convmatch run pipeline.toml
  convmatch run pipeline.toml --json
  convmatch run pipeline.toml --output report.json
  RUST_LOG=convmatch_engine=debug convmatch run pipeline.toml")]
    Run {
        /// Path to the pipeline TOML config file
        config: PathBuf,

        /// Print the run report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the run report JSON to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Validate a pipeline config without touching data files
    #[command(after_help = "\
Examples:
  convmatch validate pipeline.toml")]
    Validate {
        /// Path to the pipeline TOML config file
        config: PathBuf,
    },
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "convmatch_cli=info,convmatch_engine=info,convmatch_io=info".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            config,
            json,
            output,
        } => pipeline::cmd_run(config, json, output),
        Commands::Validate { config } => pipeline::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError {
            code,
            message,
            hint,
        }) => {
            if !message.is_empty() {
                eprintln!("error: {message}");
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}
