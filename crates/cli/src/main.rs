mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// keel - build metadata and partitioned type checking for Python workspaces
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: keel.toml in the current directory)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List targets and their types
  List {
    /// Address specs to list, e.g. `src/app:app`, `src/app:` or `src::` (default: everything)
    specs: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the dependencies of a target
  Deps {
    /// Address of the target
    spec: String,

    /// Include indirect dependencies
    #[arg(short, long)]
    transitive: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Type check Python targets with MyPy
  Typecheck {
    /// Address specs to check (default: everything)
    specs: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();
  match cli.command {
    Commands::List { specs, output } => cmd::cmd_list(config, &specs, output).map(|()| ExitCode::SUCCESS),
    Commands::Deps {
      spec,
      transitive,
      output,
    } => cmd::cmd_deps(config, &spec, transitive, output).map(|()| ExitCode::SUCCESS),
    Commands::Typecheck { specs, output } => cmd::cmd_typecheck(config, &specs, cli.verbose, output),
  }
}
