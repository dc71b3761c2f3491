//! HTTP API for todos, backed by SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod repository;

use std::future::Future;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiErrorResponse;
pub use repository::{RepositoryError, TodoRepository};

#[derive(Clone)]
pub struct AppState {
    pub repository: TodoRepository,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(repository: TodoRepository) -> Self {
        Self {
            repository,
            started_at: Instant::now(),
        }
    }

    /// Fresh, migrated in-memory database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = db::connect(&ServerConfig::default()).await?;
        db::migrate(&pool).await?;
        Ok(Self::new(TodoRepository::new(pool)))
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/todos",
            get(handlers::list_todos)
                .post(handlers::create_todo)
                .delete(handlers::clear_completed),
        )
        .route(
            "/todos/{id}",
            get(handlers::get_todo)
                .patch(handlers::update_todo)
                .delete(handlers::delete_todo),
        )
        .route("/todos/{id}/toggle", post(handlers::toggle_todo))
        .route("/stats", get(handlers::stats))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

/// Like `run`, but stops accepting connections once `shutdown` resolves and
/// drains the ones in flight.
pub async fn run_until<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
