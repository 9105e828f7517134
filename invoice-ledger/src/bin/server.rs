//! Invoice ledger server binary

use anyhow::Context;
use invoice_ledger::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting invoice ledger server");

    // Load configuration
    let config = match std::env::var("INVOICE_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    // Open ledger
    let ledger = Ledger::open(config).await.context("opening ledger")?;
    tracing::info!("Ledger opened successfully");

    // Replay the stored chain before accepting work
    let report = ledger.verify_chain().context("verifying stored chain")?;
    if !report.is_valid() {
        let invalid: Vec<_> = report.invalid().collect();
        tracing::warn!(
            invalid_blocks = report.invalid_blocks,
            details = %serde_json::to_string(&invalid)?,
            "Stored chain failed verification"
        );
    }

    let stats = ledger.stats().context("computing chain statistics")?;
    tracing::info!(
        total_invoices = stats.total_invoices,
        total_tax_collected = %stats.total_tax_collected,
        total_amount_processed = %stats.total_amount_processed,
        average_invoice_amount = %stats.average_invoice_amount,
        "Chain statistics"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down invoice ledger server");
    ledger.shutdown().await?;
    Ok(())
}
