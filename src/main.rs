use clap::Parser;
use tracing_subscriber::EnvFilter;

use expensify_tx_cli::cli::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EXTX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    expensify_tx_cli::cli::run(cli)
}
