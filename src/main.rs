mod backend;
mod config;
mod routes;
mod services;
mod state;
mod views;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration invalid");
            std::process::exit(1);
        }
    };
    if config.admins.is_empty() {
        tracing::warn!("ADMIN_EMAILS is empty; the admin dashboard will deny everyone");
    }

    let client = match backend::SupabaseClient::new(&config.backend) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "backend client init failed");
            std::process::exit(1);
        }
    };
    tracing::info!(url = %config.backend.url, admins = config.admins.len(), "backend client initialized");

    let state = state::AppState::new(client.clone(), client, &config);

    let _event_logger = services::events::spawn_event_logger(state.auth.events().subscribe());
    tracing::debug!(subscribers = state.auth.events().subscriber_count(), "auth event logger attached");
    let _session_sweeper = services::tracking::spawn_session_sweeper(
        state.auth.tracker().clone(),
        services::tracking::SESSION_SWEEP_INTERVAL,
    );

    let app = routes::app(state);
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port = config.port, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(port = config.port, site_url = %config.site_url, "gatekeeper listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
