#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pixconv: group flat pixel hit tables into per-event hit groups",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress the result summary.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Convert a hit table into one plane of an output store",
        after_help = "EXAMPLES:\n    # Author the event table from the reference plane\n    pixconv convert -i plane0.jsonl -o run7/\n\n    # Add a second plane, checked against the event table\n    pixconv convert -i plane1.jsonl -o run7/ --plane Plane1 --mode append --verify --check-timestamp"
    )]
    Convert(cmd::convert::ConvertArgs),

    #[command(about = "Segment a hit table and report counts without writing anything")]
    Inspect(cmd::inspect::InspectArgs),

    #[command(about = "Generate shell completions")]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PIXCONV_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "pixconv=debug,pixconv_core=debug,info"
        } else {
            "pixconv=info,pixconv_core=info,warn"
        })
    });

    let format = env::var("PIXCONV_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Convert(args) => cmd::convert::run_convert(args, output, cli.quiet),
        Commands::Inspect(args) => cmd::inspect::run_inspect(args, output, cli.quiet),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(command = ?cli.command, "starting");

    let output = resolve_output_mode(cli.json);
    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let cli_error = CliError::from(&err);
            if render_error(output, &cli_error).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_parses_all_flags() {
        let cli = Cli::parse_from([
            "pixconv",
            "convert",
            "-i",
            "in.jsonl",
            "-o",
            "out",
            "--plane",
            "Plane1",
            "--mode",
            "append",
            "--verify",
            "--max-events",
            "10",
            "--check-timestamp",
            "--tolerance",
            "0.05",
            "--allow-unordered",
            "--diagnostics",
            "--config",
            "pixconv.toml",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.plane.as_deref(), Some("Plane1"));
        assert_eq!(args.mode, Some(cmd::convert::ModeArg::Append));
        assert!(args.verify && args.check_timestamp && args.allow_unordered && args.diagnostics);
        assert_eq!(args.max_events, Some(10));
        assert_eq!(args.tolerance, Some(0.05));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["pixconv", "inspect", "in.jsonl", "--json", "-q"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Inspect(_)));
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["pixconv", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["pixconv", "convert", "--mode", "replace"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
