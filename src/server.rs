use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tonic::transport::Server;

use jobdash::config::{Config, Database};
use jobdash::db::MongoStore;
use jobdash::proto::job_dashboard_server::JobDashboardServer;
use jobdash::service::DashboardService;
use jobdash::{logging, Dashboard};

const CONNECT_RETRY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info");

    let config = Config::load()?;
    let addr: SocketAddr = config
        .address()
        .parse()
        .with_context(|| format!("invalid server address {}", config.address()))?;

    // Serve right away; requests get NotReady until the store connects.
    let dashboard = Arc::new(Dashboard::new(config.title()));
    tokio::spawn(connect_store(config.database(), dashboard.clone()));

    tracing::info!(%addr, "Job dashboard listening");
    Server::builder()
        .add_service(JobDashboardServer::new(DashboardService::new(dashboard)))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn connect_store(database: Database, dashboard: Arc<Dashboard>) {
    loop {
        match MongoStore::connect(&database).await {
            Ok(store) => {
                store.ensure_indexes().await;
                dashboard.attach(Arc::new(store));
                tracing::info!("Job store ready");
                return;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    retry_in_secs = CONNECT_RETRY.as_secs(),
                    "Could not connect to job store"
                );
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}
