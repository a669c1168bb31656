pub mod api;
pub mod config;
pub mod dataset;
pub mod middleware;
pub mod model;
pub mod server;
pub mod train;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Model error: {0}")]
    Model(#[from] model::ModelError),
    #[error("Server error: {0}")]
    Server(String),
}

pub async fn run(config_path: &str, debug_logs: bool) -> Result<(), ServerError> {
    let mut config = config::Config::from_file(config_path)?;
    config.debug_logs = debug_logs;

    info!("Using config file: {}", config_path);
    info!("Model name: {}", config.metadata.name);
    if debug_logs {
        info!("Debug logging enabled");
    }

    // Startup-fatal by design: if any asset is missing or inconsistent
    // the process must not serve.
    info!("Loading model from: {}", config.model.dir);
    let model = Arc::new(model::ModelWrapper::load(Path::new(&config.model.dir))?);
    info!(
        users = model.parameters().n_users,
        items = model.parameters().n_items,
        factors = model.parameters().factors,
        "Model loaded"
    );

    let address = config.listen.address.as_deref().unwrap_or("[::]");
    let port = &config.listen.port;
    let addr: SocketAddr = format!("{}:{}", address, port)
        .parse()
        .map_err(|e| ServerError::Server(format!("Invalid address: {}", e)))?;

    let has_tls = config.listen.tlscert.is_some() && config.listen.tlskey.is_some();

    let state = server::AppState::new(config.clone(), model);
    let app = server::build_router(state);

    if has_tls {
        let cert_path = config.listen.tlscert.as_deref().unwrap_or_default();
        let key_path = config.listen.tlskey.as_deref().unwrap_or_default();

        info!("Loading TLS certificate from {}", cert_path);
        info!("Loading TLS key from {}", key_path);

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to load TLS config: {}", e)))?;

        info!("Serving HTTPS on {}", addr);

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    } else {
        info!("Serving HTTP on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    }

    Ok(())
}
