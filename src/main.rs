use anyhow::Context;
use clap::Parser;
use std::net::Ipv4Addr;
use std::sync::Arc;
use study_assistant::{api, config, logging, service::StudyService};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "study-assistant",
    about = "Document Q&A and quiz generation server"
)]
struct Cli {
    /// Port to listen on (overrides SERVER_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let service = StudyService::from_config(config)
        .await
        .context("Failed to initialize study service")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let port = cli.port.unwrap_or(config.server_port);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
