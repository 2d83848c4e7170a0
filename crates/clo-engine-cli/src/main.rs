mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::deal::RunDealArgs;
use commands::filter::FilterCheckArgs;
use commands::threshold::ThresholdArgs;

/// CLO cash-flow engine command-line front end
#[derive(Parser)]
#[command(
    name = "clo-cli",
    version,
    about = "CLO cash-flow projection and waterfall engine",
    long_about = "A CLI for the CLO deal computation engine: runs a deal's period loop \
                  end to end from a typed deal configuration, resolves compliance \
                  thresholds, and checks collateral-pool filter expressions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deal's period loop end to end and report the journal/summary
    Run(RunDealArgs),
    /// Resolve the effective compliance threshold at an analysis date
    Threshold(ThresholdArgs),
    /// Parse a collateral-pool filter expression and re-render its AST
    FilterCheck(FilterCheckArgs),
    /// Print the CLI version
    Version,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::deal::run_deal(args),
        Commands::Threshold(args) => commands::threshold::run_threshold(args),
        Commands::FilterCheck(args) => commands::filter::run_filter_check(args),
        Commands::Version => {
            println!("clo-cli {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
