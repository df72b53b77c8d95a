use std::path::PathBuf;
use std::process::ExitCode;

use bindscope::commands;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Dependency-graph analyzer for managed and native binary modules.
///
/// The binary is intentionally thin: it parses args, dispatches to command
/// helpers, and lets `bindscope-core` + `commands` own the real work for
/// testability and reuse.
#[derive(Parser, Debug)]
#[command(
    name = "bindscope",
    version,
    about = "Simulate assembly binding over a file or directory of modules",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// File or directory to analyze (shorthand for `analyze <path>`).
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a file or directory and print the dependency graph.
    Analyze {
        /// File or directory containing candidate modules.
        path: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Package root directory to index (repeatable). Defaults to the
        /// per-user package cache.
        #[arg(long = "package-root")]
        package_roots: Vec<PathBuf>,

        /// Skip package-cache resolution entirely.
        #[arg(long, default_value_t = false)]
        no_packages: bool,

        /// Override the persistent hash-cache location.
        #[arg(long)]
        hash_cache: Option<PathBuf>,
    },

    /// Inspect a single module and print its record without binding.
    Inspect {
        /// Module file to inspect.
        path: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Inspect one module and write its binary-encoded record to stdout.
    ///
    /// This is the process-isolated helper surface; consumers decode the
    /// stream with the module codec.
    #[command(hide = true)]
    Bridge {
        /// Module file to inspect.
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // clap's auto-exit would report usage errors with its own exit code;
    // every malformed invocation has to leave through the same -1 path as
    // the no-argument case.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let usage_error = err.use_stderr();
            let _ = err.print();
            return if usage_error { ExitCode::from(255) } else { ExitCode::SUCCESS };
        }
    };
    let result = match (cli.command, cli.path) {
        (Some(command), _) => run(command),
        (None, Some(path)) => commands::analyze_command(&path, &commands::AnalyzeOptions::default()),
        (None, None) => {
            eprintln!("bindscope: missing file or directory argument");
            return ExitCode::from(255);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bindscope: {err:#}");
            ExitCode::from(255)
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Analyze { path, json, package_roots, no_packages, hash_cache } => {
            let options = commands::AnalyzeOptions { json, package_roots, no_packages, hash_cache };
            commands::analyze_command(&path, &options)
        }
        Command::Inspect { path, json } => commands::inspect_command(&path, json),
        Command::Bridge { path } => commands::bridge_command(&path),
    }
}
