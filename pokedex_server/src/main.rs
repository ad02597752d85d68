//! Pokedex server: loads settings from the environment, connects the data source and serves the API.
//!
//! Run from repo root: `cargo run -p pokedex-server`

use pokedex_api::{app, connect, AppState, PokemonRepository, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("pokedex_api=info,pokedex_server=info,tower_http=info")
            }),
        )
        .init();

    let settings = Settings::from_env()?;
    let data_source = connect(&settings.data_source).await?;
    tracing::info!(
        datasource = %data_source.name(),
        connector = data_source.connector(),
        "data source connected"
    );
    let state = AppState::new(PokemonRepository::new(data_source));

    let router = app(state, &settings);
    let listener = TcpListener::bind(settings.listen_addr()).await?;
    tracing::info!("Pokedex API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
