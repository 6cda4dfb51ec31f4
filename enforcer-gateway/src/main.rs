mod config;
mod enforcement;
mod errors;
mod forward;
mod health;
mod state;
#[cfg(test)]
mod test_utils;

use crate::config::GatewaySettings;
use crate::state::AppState;
use axum::{middleware, routing::any, Router};
use log::{error, info};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = match GatewaySettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    // Discovery and path configuration happen once, before accepting traffic
    let state = match AppState::new(settings).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize policy enforcer: {}", e);
            std::process::exit(1);
        }
    };
    let app = create_app(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Gateway running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server shutdown complete");
}

/// Create the gateway router for a given state
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(protected_routes(&state))
        .with_state(state)
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .fallback(any(forward::forward_to_upstream))
        // layer, not route_layer, so that the fallback is enforced too
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforcement::enforce,
        ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
