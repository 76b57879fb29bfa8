//! intakectl - drive adaptive intake assessments from the terminal.

mod commands;
mod state;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intakectl")]
#[command(about = "Adaptive health intake assessment runner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new assessment
    Run(commands::RunArgs),

    /// Resume a paused assessment from its state file
    Resume(commands::ResumeArgs),

    /// Print the summary of a stored assessment
    Summary(commands::SummaryArgs),

    /// Inspect a question bank
    Bank(commands::BankArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => commands::run(args).await,
        Commands::Resume(args) => commands::resume(args).await,
        Commands::Summary(args) => commands::summary(args),
        Commands::Bank(args) => commands::bank(args),
    }
}
