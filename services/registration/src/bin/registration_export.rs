use anyhow::{Context, Result};
use clap::Parser;
use registration_service::telemetry::init_tracing;
use registration_service::{
    open_repository, Config, RecordStore, RegistrationSchema, WorkbookRenderer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "registration-export", about = "Export all registrations to an XLSX workbook")]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "registrations_export.xlsx")]
    output: PathBuf,

    /// Public base URL used in attachment hyperlinks (overrides export.public_base_url)
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.service.log_level);

    if let Some(base_url) = args.base_url {
        config.export.public_base_url = base_url;
    }

    let schema = Arc::new(RegistrationSchema::standard());
    let repository = open_repository(&config.database).await?;
    let store = RecordStore::new(schema, repository);

    let registrations = store
        .list()
        .await
        .context("Failed to fetch registrations")?;
    info!(count = registrations.len(), "Found registrations");

    if registrations.is_empty() {
        info!("No data to export");
        return Ok(());
    }

    let renderer = WorkbookRenderer::new(store.schema(), &config.export);
    let buffer = tokio::task::spawn_blocking(move || renderer.render(&registrations))
        .await
        .context("Workbook rendering task failed")?
        .context("Failed to render workbook")?;

    tokio::fs::write(&args.output, &buffer)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(path = %args.output.display(), bytes = buffer.len(), "Workbook saved");

    Ok(())
}
