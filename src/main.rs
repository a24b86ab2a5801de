use std::net::SocketAddr;

use tracing::info;

use realtime_service::config::Config;
use realtime_service::error::AppError;
use realtime_service::logging::init_tracing;
use realtime_service::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    let config = Config::from_env()?;
    let state = AppState::new(&config)?;
    let app = realtime_service::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "realtime service listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
