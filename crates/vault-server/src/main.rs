use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use vault_api::bootstrap::AuthBootstrap;
use vault_api::{AppState, AppStateInner};
use vault_backend::config::{BackendKind, VaultConfig};
use vault_backend::error::VaultError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "socialvault=debug,vault_api=debug,vault_backend=debug,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let config = match VaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let diagnosis = config.firebase.diagnose();
    if config.backend == BackendKind::Remote || diagnosis.has_any_values {
        info!("{}", config.firebase.report());
    }
    if config.backend == BackendKind::Remote && !diagnosis.is_complete {
        warn!("Firebase configuration is incomplete: {:?}", diagnosis.missing_vars);
    }

    // Backend
    let backend = match vault_backend::connect(&config).await {
        Ok(backend) => backend,
        Err(VaultError::Config(e)) => {
            error!("Cannot start: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    // Auth bootstrap
    let auth = AuthBootstrap::mount(&*backend, config.auth_timeout);

    let state: AppState = Arc::new(AppStateInner {
        backend,
        auth,
        firebase: config.firebase.clone(),
    });

    let app = vault_api::router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SocialVault listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.auth.teardown();
    info!("SocialVault stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
