use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use uplink::config::{ConfigFile, HubConfig};
use uplink::hub::Hub;

mod database;
mod error;
mod pool;

use database::LibsqlStorage;
use error::AppError;

#[derive(Parser)]
#[command(name = "uplink-hub", version, about = "Dispatches uptime checks to connected validators")]
struct Cli {
    /// Path to hub.toml, created with defaults when missing
    #[arg(long, env = "UPLINK_HUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let config = HubConfig::from_config(cli.config.as_ref())?;
    info!("{config}");

    let pool = pool::open_pool(&config.database.path).await?;
    {
        let conn = pool.get().await.map_err(anyhow::Error::from)?;
        database::initialize_database(&conn).await?;
    }
    let storage = Arc::new(LibsqlStorage::new_from_pool(pool));

    let listener = TcpListener::bind(config.server.listen_addr()).await?;
    let hub = Hub::new(storage, config.dispatch);

    tokio::select! {
        _ = hub.run(listener) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down hub"),
    }

    Ok(())
}
