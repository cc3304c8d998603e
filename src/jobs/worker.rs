use super::{Job, JobResult};
use crate::engine::Engine;

/// Run one job's phase handler and turn its outcome into a job result.
/// Handlers commit before returning, so a result is only reported once the
/// writes are durable.
pub async fn run_job(engine: &Engine, job: &Job) -> JobResult {
    tracing::debug!(job = job.name(), entity_id = %job.entity_id(), "Running job");

    let outcome = match job {
        Job::PartGeneration { project_id } => engine.generate_parts(*project_id).await,
        Job::ChapterDetailing { part_id } => engine.detail_chapters(*part_id).await,
        Job::ChapterGeneration { chapter_id } => engine.write_chapter(*chapter_id).await,
        Job::TransitionAnalysis { chapter_id } => engine.analyze_transition(*chapter_id).await,
        Job::Finalization {
            project_id,
            task_type,
        } => engine.finalize_book(*project_id, *task_type).await,
    };

    JobResult::from_outcome(job, &outcome)
}
