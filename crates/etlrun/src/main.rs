use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use etlcode::Catalog;
use etlrun::Harness;
use etlrun::HarnessConfig;

#[derive(Parser)]
#[command(
    name = "etlrun",
    version,
    about = "Runs a rendered ETL script over one object read from stdin"
)]
struct Cli {
    /// Path to the rendered script
    #[arg(long)]
    script: PathBuf,

    /// Bytes per chunk for streaming scripts (0 = whole object)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Load and verify the script, then exit
    #[arg(long)]
    check: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "ETL_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let script = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read script {}", cli.script.display()))?;
    let pipeline = etlrun::load(&script, &Catalog::builtin()).context("failed to load script")?;
    tracing::info!(mode = %pipeline.mode(), "script loaded");

    if cli.check {
        return Ok(());
    }

    let mut config = HarnessConfig::from_env()?;
    if let Some(n) = cli.chunk_size {
        config = config.chunk_size(n);
    }
    let harness = Harness::new(pipeline, config);

    let mut object = Vec::new();
    tokio::io::stdin().read_to_end(&mut object).await?;

    let response = harness.serve(&object).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&response.body).await?;
    stdout.flush().await?;
    Ok(())
}

/// stdout carries nothing but the response body, so every log line goes to
/// stderr. `RUST_LOG` takes precedence over `--log-level`.
fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
