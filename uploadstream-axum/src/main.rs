use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uploadstream_axum::Server;
use uploadstream_core::Settings;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if settings.get("log.format") == Some("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env();
    init_tracing(&settings);

    let server = Server::build(&settings).await?;
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    info!("[uploadstream] starting on http://{}", server.http.addr());
    server.run().await
}
