use anyhow::Result;
use clap::Parser;
use fundflow::application::{boundary_message, is_fault};
use fundflow::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Err(err) = cli.run().await else {
        return Ok(());
    };
    if is_fault(&err) {
        // Faults keep their detail in the log only
        tracing::error!("{:#}", err);
    }
    anyhow::bail!(boundary_message(&err))
}
