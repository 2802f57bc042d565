pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "onay",
    about = "Onay approval workflow operator CLI",
    long_about = "Operate the approval workflow engine: migrations, demo data, config inspection, stage definitions and readiness checks.",
    after_help = "Examples:\n  onay doctor --json\n  onay stages --file config/stages.toml\n  onay seed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load demo workflow entities across every built-in workflow type")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, stage definitions, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the effective approval chains, or validate a definitions file")]
    Stages {
        #[arg(long, help = "Validate this TOML definitions file instead of the configured one")]
        file: Option<PathBuf>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Stages { file, json } => commands::stages::run(file.as_deref(), json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
