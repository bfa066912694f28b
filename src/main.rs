use anyhow::Result;
use clap::{Parser, Subcommand};
use stela::build::{build_site, RunReport};
use stela::config::{Config, Overrides, SortKey};
use std::path::PathBuf;
use std::process::ExitCode;

/// Static site generator for a personal technical blog.
#[derive(Parser)]
#[command(version, about, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one generation pass over the project's source tree.
    Build {
        /// Project directory containing stela.yaml (default: search upward
        /// from the current directory).
        #[arg(long)]
        project: Option<PathBuf>,

        /// Destination root override.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Collection sort key override.
        #[arg(long, value_enum)]
        sort: Option<SortKey>,

        /// Worker threads (default: one per core).
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    match run(Cli::parse()) {
        Ok(report) => {
            print_summary(&report);
            match report.is_success() {
                true => ExitCode::SUCCESS,
                false => ExitCode::FAILURE,
            }
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    let Command::Build {
        project,
        output,
        sort,
        threads,
    } = cli.command;

    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let start = match project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = Config::from_directory(
        &start,
        Overrides {
            output_directory: output,
            sort,
        },
    )?;

    Ok(build_site(&config)?)
}

fn print_summary(report: &RunReport) {
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    for failure in &report.failures {
        eprintln!("error: {}", failure);
    }
    eprintln!(
        "{} pages written, {} documents skipped, {} write failures",
        report.pages.saturating_sub(report.failures.len()),
        report.warnings.len(),
        report.failures.len()
    );
}
