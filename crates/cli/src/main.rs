mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{StackArgs, StateArgs};
use output::OutputFormat;

/// provis - provision container stacks on remote hosts
#[derive(Parser)]
#[command(name = "provis")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show what apply would change
  Plan {
    #[command(flatten)]
    stack: StackArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },

  /// Bring the stack to the desired state and record it
  Apply {
    #[command(flatten)]
    stack: StackArgs,
  },

  /// Tear down everything recorded for a stack
  Destroy {
    #[command(flatten)]
    state: StateArgs,
  },

  /// Print the bounded resource name for a label
  Name {
    label: String,

    #[arg(default_value_t = provis_lib::consts::MAX_NAME_LEN)]
    max_len: usize,
  },

  /// Print content fingerprints of files, strings or stdin
  Fingerprint {
    files: Vec<PathBuf>,

    /// Fingerprint the concatenation of these strings instead
    #[arg(short, long = "string")]
    strings: Vec<String>,
  },
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match cli.command {
    Commands::Plan { stack, output } => cmd::cmd_plan(&stack, output, cli.verbose),
    Commands::Apply { stack } => cmd::cmd_apply(&stack),
    Commands::Destroy { state } => cmd::cmd_destroy(&state),
    Commands::Name { label, max_len } => cmd::cmd_name(&label, max_len),
    Commands::Fingerprint { files, strings } => cmd::cmd_fingerprint(&files, &strings),
  }
}
