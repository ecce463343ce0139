use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use comfyui_post_relay::{api, config, flows::Relay};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::Config::dotenv_load();
    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    config.log_summary();

    let relay = Relay::from_config(&config).await;
    let app = api::router(Arc::new(api::AppState {
        relay,
        max_upload_bytes: config.max_upload_bytes,
    }));

    let host_str = config.api_host.clone();
    let port_str = config.api_port.clone();
    let ip: std::net::IpAddr = host_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 127.0.0.1", host_str);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let port: u16 = port_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8189", port_str);
        8189
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("listening on {}", socket_address);
    if let Err(e) = axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
