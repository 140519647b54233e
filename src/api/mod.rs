mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::StorePaths;
use crate::db::Database;

/// Everything a request handler needs, passed as router state instead of
/// being read from ambient globals.
#[derive(Clone)]
pub struct AppContext {
    pub db: Database,
    pub paths: StorePaths,
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks", post(handlers::create_task))
        .route("/tasks/{id}", put(handlers::toggle_task))
        .route("/skills", get(handlers::list_skills))
        .route("/skills", post(handlers::upsert_skill))
        .route("/summary", get(handlers::summary))
        .route("/auto", post(handlers::auto_log))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
