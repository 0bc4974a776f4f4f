use std::net::SocketAddr;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use lingua_backend_rust::cache::MemoryCache;
use lingua_backend_rust::config::Config;
use lingua_backend_rust::db::Database;
use lingua_backend_rust::logging;
use lingua_backend_rust::routes;
use lingua_backend_rust::services::plan::PlanService;
use lingua_backend_rust::services::planner::LlmPlanner;
use lingua_backend_rust::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config);

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "database initialization failed");
            std::process::exit(1);
        }
    };

    let cache = MemoryCache::new();
    let planner = LlmPlanner::new(config.planner.clone());
    if !planner.is_available() {
        tracing::warn!("LLM_API_KEY not set, plan generation will use the fallback");
    }
    let plan = PlanService::new(db.clone(), cache.clone(), planner);
    let state = AppState::new(db, cache, plan);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    tracing::info!(%addr, "lingua-backend-rust listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
