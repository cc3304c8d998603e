use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::engine::{Engine, FinalizationTask, PhaseError};
use crate::jobs::{Job, JobError, JobQueue, JobRecord, JobStatus};
use crate::models::*;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Checkpoint errors: validation problems are the caller's to fix and are
/// returned as-is; storage failures stay server-side.
fn phase_error(e: PhaseError) -> (StatusCode, String) {
    match e {
        PhaseError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        PhaseError::Transition(_) => {
            tracing::warn!("Rejected status change: {}", e);
            (StatusCode::CONFLICT, e.to_string())
        }
        PhaseError::Storage(_) | PhaseError::Generation(_) => internal_error(e),
        _ => {
            tracing::warn!("Validation error: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

fn job_error(e: JobError) -> (StatusCode, String) {
    match e {
        JobError::Closed => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        _ => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn not_found(entity: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", entity))
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
}

fn accept(queue: &JobQueue, job: Job) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let handle = queue.submit(job).map_err(job_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: handle.id,
            status: handle.status(),
        }),
    ))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(db): State<Database>) -> ApiResult<Json<Vec<Project>>> {
    db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if input.blueprint.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Blueprint must not be empty".to_string()));
    }
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProjectWithParts>> {
    db.get_project_with_parts(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db.delete_project(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Project"))
    }
}

pub async fn get_usage_log(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<UsageLogEntry>>> {
    if db.get_project(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Project"));
    }
    db.get_usage_log(id).map(Json).map_err(internal_error)
}

pub async fn generate_parts(
    State(db): State<Database>,
    State(queue): State<JobQueue>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    if db.get_project(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Project"));
    }
    accept(&queue, Job::PartGeneration { project_id: id })
}

pub async fn finalize_parts(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    Json(outline): Json<PartListOutline>,
) -> ApiResult<Json<Vec<Part>>> {
    engine.finalize_parts(id, outline).map(Json).map_err(phase_error)
}

pub async fn finalize_book(
    State(db): State<Database>,
    State(queue): State<JobQueue>,
    Path((id, task_type)): Path<(Uuid, String)>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let task_type = FinalizationTask::from_str(&task_type).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown task type '{}'", task_type),
        )
    })?;
    if db.get_project(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Project"));
    }
    accept(
        &queue,
        Job::Finalization {
            project_id: id,
            task_type,
        },
    )
}

// ============================================================
// Parts
// ============================================================

pub async fn get_part(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PartWithChapters>> {
    db.get_part_with_chapters(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Part"))
}

pub async fn generate_chapters(
    State(db): State<Database>,
    State(queue): State<JobQueue>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    if db.get_part(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Part"));
    }
    accept(&queue, Job::ChapterDetailing { part_id: id })
}

pub async fn finalize_chapters(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    Json(outline): Json<ChapterListOutline>,
) -> ApiResult<Json<Vec<Chapter>>> {
    engine
        .finalize_chapters(id, outline)
        .map(Json)
        .map_err(phase_error)
}

// ============================================================
// Chapters
// ============================================================

pub async fn get_chapter(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Chapter>> {
    db.get_chapter(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Chapter"))
}

pub async fn generate_chapter(
    State(db): State<Database>,
    State(queue): State<JobQueue>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    if db.get_chapter(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Chapter"));
    }
    accept(&queue, Job::ChapterGeneration { chapter_id: id })
}

pub async fn analyze_transition(
    State(db): State<Database>,
    State(queue): State<JobQueue>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    if db.get_chapter(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Chapter"));
    }
    accept(&queue, Job::TransitionAnalysis { chapter_id: id })
}

pub async fn review_chapter(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReviewChapterInput>,
) -> ApiResult<Json<ChapterVersion>> {
    engine.review_chapter(id, input).map(Json).map_err(phase_error)
}

pub async fn get_chapter_versions(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ChapterVersion>>> {
    if db.get_chapter(id).map_err(internal_error)?.is_none() {
        return Err(not_found("Chapter"));
    }
    db.get_chapter_versions(id).map(Json).map_err(internal_error)
}

// ============================================================
// Jobs
// ============================================================

pub async fn get_job(
    State(queue): State<JobQueue>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    queue.record(id).map(Json).ok_or_else(|| not_found("Job"))
}
