//! `quill` -- run quill generators from the terminal.
//!
//! Provides the following subcommands:
//!
//! - `quill generate` -- Send one prompt to a GPT generator and print the output.
//! - `quill describe` -- Print the descriptor of the configured generator.

use clap::{Parser, Subcommand};

mod commands;

/// quill generator CLI.
#[derive(Parser)]
#[command(name = "quill", about = "quill generator CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate replies for a prompt.
    Generate(commands::generate::GenerateArgs),

    /// Print the generator descriptor (type and init parameters).
    Describe(commands::describe::DescribeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Generate(args) => commands::generate::run(args).await?,
        Commands::Describe(args) => commands::describe::run(args)?,
    }

    Ok(())
}
