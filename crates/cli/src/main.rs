mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use crtopdf::{LaunchConfig, Session};
use tracing::{error, info};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(target = "crtopdf", error = %err, "conversion failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let session = Session::launch(LaunchConfig {
        browser_path: cli.browser_path.clone(),
        port: None,
    })
    .await?;

    let converted = convert_and_write(&session, &cli).await;
    // Tear down on both paths; a teardown failure is only worth reporting
    // when the conversion itself succeeded.
    let disposed = session.dispose().await;
    converted?;
    disposed?;
    Ok(())
}

async fn convert_and_write(session: &Session, cli: &Cli) -> anyhow::Result<()> {
    let pdf = session.convert(&cli.request()).await?;
    std::fs::write(&cli.output, &pdf)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!(
        target = "crtopdf",
        bytes = pdf.len(),
        path = %cli.output.display(),
        "wrote PDF"
    );
    Ok(())
}
