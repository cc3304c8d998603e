use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use super::{run_job, Job, JobError, JobResult};
use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Complete,
    Failed,
    NotFound,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::NotFound => "not_found",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job: Job,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Finished records kept for status lookups when no limit is given.
pub const DEFAULT_RETAINED_JOBS: usize = 1000;

#[derive(Default)]
struct State {
    records: HashMap<Uuid, JobRecord>,
    /// Queued or running jobs, for dedup.
    active: HashMap<Job, Uuid>,
    /// Finished job ids, oldest first.
    finished: VecDeque<Uuid>,
}

impl State {
    /// Drop the oldest finished records beyond `retain`. Evicted ids read
    /// as not found.
    fn evict(&mut self, retain: usize) {
        while self.finished.len() > retain {
            if let Some(id) = self.finished.pop_front() {
                self.records.remove(&id);
            }
        }
    }
}

struct Inner {
    sender: mpsc::UnboundedSender<Uuid>,
    state: Mutex<State>,
    finished: Notify,
    retain: usize,
}

/// Shared handle to the queue; clones refer to the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

/// Reference to one enqueued job.
#[derive(Clone)]
pub struct JobHandle {
    pub id: Uuid,
    queue: JobQueue,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        self.queue.status(self.id)
    }

    /// Available once the job completed or failed.
    pub fn result(&self) -> Option<JobResult> {
        self.queue.result(self.id)
    }

    /// Wait until the job has finished and return its result.
    pub async fn wait(&self) -> Option<JobResult> {
        loop {
            let notified = self.queue.inner.finished.notified();
            match self.status() {
                JobStatus::NotFound => return None,
                status if status.is_finished() => return self.result(),
                _ => notified.await,
            }
        }
    }
}

impl JobQueue {
    /// Create the queue and spawn `workers` tasks that drain it through
    /// `engine`. Must be called inside a tokio runtime.
    pub fn start(engine: Engine, workers: usize) -> Self {
        Self::start_retaining(engine, workers, DEFAULT_RETAINED_JOBS)
    }

    /// Like [`JobQueue::start`], keeping at most `retain` finished records.
    pub fn start_retaining(engine: Engine, workers: usize, retain: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(Inner {
                sender,
                state: Mutex::new(State::default()),
                finished: Notify::new(),
                retain,
            }),
        };

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for worker in 0..workers.max(1) {
            let queue = queue.clone();
            let engine = engine.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(id) = next else {
                        break;
                    };
                    queue.process(worker, &engine, id).await;
                }
                tracing::debug!(worker, "Job worker stopped");
            });
        }
        tracing::info!(workers, retain, "Job queue started");
        queue
    }

    /// Enqueue a job by name and positional arguments.
    pub fn enqueue(&self, job_name: &str, args: &[&str]) -> Result<JobHandle, JobError> {
        self.submit(Job::from_args(job_name, args)?)
    }

    pub fn submit(&self, job: Job) -> Result<JobHandle, JobError> {
        let mut state = self.inner.state.lock().expect("job queue lock poisoned");
        if let Some(&existing) = state.active.get(&job) {
            tracing::debug!(job = job.name(), job_id = %existing, "Identical job already pending");
            return Ok(self.handle(existing));
        }

        let id = Uuid::new_v4();
        self.inner.sender.send(id).map_err(|_| JobError::Closed)?;
        tracing::info!(job = job.name(), job_id = %id, entity_id = %job.entity_id(), "Job queued");
        state.active.insert(job.clone(), id);
        state.records.insert(
            id,
            JobRecord {
                id,
                job,
                status: JobStatus::Queued,
                result: None,
                enqueued_at: Utc::now(),
                finished_at: None,
            },
        );
        Ok(self.handle(id))
    }

    pub fn handle(&self, id: Uuid) -> JobHandle {
        JobHandle {
            id,
            queue: self.clone(),
        }
    }

    pub fn status(&self, id: Uuid) -> JobStatus {
        self.record(id)
            .map(|r| r.status)
            .unwrap_or(JobStatus::NotFound)
    }

    pub fn result(&self, id: Uuid) -> Option<JobResult> {
        self.record(id).and_then(|r| r.result)
    }

    pub fn record(&self, id: Uuid) -> Option<JobRecord> {
        let state = self.inner.state.lock().expect("job queue lock poisoned");
        state.records.get(&id).cloned()
    }

    async fn process(&self, worker: usize, engine: &Engine, id: Uuid) {
        let job = {
            let mut state = self.inner.state.lock().expect("job queue lock poisoned");
            let Some(record) = state.records.get_mut(&id) else {
                return;
            };
            record.status = JobStatus::InProgress;
            record.job.clone()
        };
        tracing::debug!(worker, job = job.name(), job_id = %id, "Job started");

        // A separate task so a panicking handler fails the job, not the worker.
        let task = {
            let engine = engine.clone();
            let job = job.clone();
            tokio::spawn(async move { run_job(&engine, &job).await })
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job = job.name(), job_id = %id, "Job handler panicked: {}", e);
                JobResult::failed(&job, format!("worker crashed: {}", e))
            }
        };
        let status = if result.is_success() {
            JobStatus::Complete
        } else {
            JobStatus::Failed
        };

        {
            let mut state = self.inner.state.lock().expect("job queue lock poisoned");
            state.active.remove(&job);
            if let Some(record) = state.records.get_mut(&id) {
                record.status = status;
                record.result = Some(result);
                record.finished_at = Some(Utc::now());
                state.finished.push_back(id);
            }
            state.evict(self.inner.retain);
        }
        tracing::info!(job = job.name(), job_id = %id, status = status.as_str(), "Job finished");
        self.inner.finished.notify_waiters();
    }
}
