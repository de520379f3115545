//! Visitor gender - main entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;
use visitor_gender::cli::{cmd_info, cmd_predict, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("visitor_gender=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visitor_gender=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Train { run } => cmd_train(&run)?,
        Commands::Predict { run, output } => cmd_predict(&run, output.as_deref())?,
        Commands::Info { data, model, delimiter } => {
            cmd_info(data.as_deref(), model.as_deref(), delimiter)?
        }
    }

    Ok(())
}
