mod config;
mod handlers;
mod registry;
mod simulator;
mod state;
mod store;

use crate::config::Config;
use crate::state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("server=debug,tower_http=info")
        .init();

    let config = Config::from_env();

    // carpeta de uploads (los datasets subidos viven ahí)
    std::fs::create_dir_all(config.uploads_dir()).unwrap();

    let port = config.port;
    let state = AppState::new(config);

    // router HTTP + UI estática
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await.unwrap();
    info!("server escuchando en {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
