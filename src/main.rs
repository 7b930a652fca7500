mod config;
mod envelope;
mod registry;
mod routes;
mod state;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::RelayConfig::from_env().expect("invalid relay configuration");
    let addr = config.bind_addr();
    let state = state::AppState::new(config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "relay listening");
    axum::serve(listener, app).await.expect("server failed");
}
