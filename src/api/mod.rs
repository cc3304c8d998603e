mod handlers;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::engine::Engine;
use crate::jobs::JobQueue;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(engine: Engine, queue: JobQueue) -> Self {
        Self { engine, queue }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.engine.db().clone()
    }
}

impl FromRef<AppState> for Engine {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for JobQueue {
    fn from_ref(state: &AppState) -> Self {
        state.queue.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project).delete(handlers::delete_project),
        )
        .route("/projects/{id}/usage", get(handlers::get_usage_log))
        .route("/projects/{id}/generate-parts", post(handlers::generate_parts))
        .route("/projects/{id}/finalize-parts", put(handlers::finalize_parts))
        .route("/projects/{id}/finalize/{task_type}", post(handlers::finalize_book))
        // Parts
        .route("/parts/{id}", get(handlers::get_part))
        .route("/parts/{id}/generate-chapters", post(handlers::generate_chapters))
        .route("/parts/{id}/finalize-chapters", put(handlers::finalize_chapters))
        // Chapters
        .route("/chapters/{id}", get(handlers::get_chapter))
        .route("/chapters/{id}/generate", post(handlers::generate_chapter))
        .route("/chapters/{id}/analyze-transition", post(handlers::analyze_transition))
        .route("/chapters/{id}/review", put(handlers::review_chapter))
        .route("/chapters/{id}/versions", get(handlers::get_chapter_versions))
        // Jobs
        .route("/jobs/{id}", get(handlers::get_job))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
