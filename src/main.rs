use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;

use pawlog::server::PetCareServer;
use pawlog::{Config, PetCare};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let care = PetCare::from_config(&config).map_err(|e| {
        format!(
            "{e}. Set PAWLOG_DATA_DIR to a writable directory for the local store."
        )
    })?;
    info!(pet = %care.pet_name(), "pawlog MCP server starting");

    let server = PetCareServer::new(Arc::new(care));
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
