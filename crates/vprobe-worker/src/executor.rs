//! Job executor: the submission and query façade.
//!
//! Each submitted job gets its own task and a [`JobHandle`] holding the task's
//! join handle and cancellation sender. Submission writes the initial record
//! before it returns the ID, so an immediate status query always finds it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use vprobe_media::{cancelled, MediaToolchain};
use vprobe_models::{JobId, JobRecord, JobState};
use vprobe_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{self, InFlightGuard};
use crate::pipeline::{JobOutcome, JobPipeline};
use crate::retention::RetentionSweeper;

/// Handle to one job's task.
pub struct JobHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Request cancellation. Returns `false` if the task already finished.
    pub fn cancel(&self) -> bool {
        if self.task.is_finished() {
            return false;
        }
        self.cancel.send_replace(true);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Submission/query façade over the job store and pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    store: Arc<JobStore>,
    pipeline: Arc<JobPipeline>,
    admission: Option<Arc<Semaphore>>,
    handles: DashMap<JobId, JobHandle>,
    accepting: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, store: Arc<JobStore>, toolchain: Arc<dyn MediaToolchain>) -> Self {
        let pipeline = Arc::new(JobPipeline::new(Arc::clone(&store), toolchain));
        let admission = config
            .max_concurrent_jobs
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            store,
            pipeline,
            admission,
            handles: DashMap::new(),
            accepting: AtomicBool::new(true),
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Register a job for an already-staged input and start its pipeline.
    ///
    /// Returns as soon as the record exists; no stage is awaited. Must be
    /// called from within a Tokio runtime.
    pub fn submit(&self, staged_path: PathBuf) -> WorkerResult<JobId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(WorkerError::ShuttingDown);
        }

        self.reap_finished();

        let id = JobId::new();
        let record = match self.admission {
            Some(_) => self.store.create_queued(&id)?,
            None => self.store.create(&id)?,
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let span = JobLogger::new(&id).create_span();
        let task = tokio::spawn(
            run_job(
                Arc::clone(&self.pipeline),
                self.admission.clone(),
                id.clone(),
                staged_path.clone(),
                cancel_rx,
            )
            .instrument(span),
        );
        self.handles.insert(
            id.clone(),
            JobHandle {
                cancel: cancel_tx,
                task,
            },
        );
        // Shutdown may have snapshotted the handles since the check above;
        // a job registered that late is cancelled like any other in-flight job
        if !self.accepting.load(Ordering::SeqCst) {
            if let Some(handle) = self.handles.get(&id) {
                handle.cancel();
            }
        }

        metrics::record_job_submitted();
        info!(
            job_id = %id,
            state = %record.state,
            input = %staged_path.display(),
            "Job submitted"
        );
        Ok(id)
    }

    /// Current snapshot of a job.
    pub fn query_status(&self, id: &JobId) -> WorkerResult<JobRecord> {
        self.store.get(id).ok_or_else(|| WorkerError::not_found(id))
    }

    /// Full decode log of a completed job.
    ///
    /// Jobs that are still running or that failed have no log.
    pub fn query_log(&self, id: &JobId) -> WorkerResult<Arc<str>> {
        let record = self.query_status(id)?;
        if record.state != JobState::Completed {
            return Err(WorkerError::not_found(id));
        }
        self.store.get_log(id).ok_or_else(|| WorkerError::not_found(id))
    }

    /// Ask a running or queued job to stop.
    ///
    /// Returns `Ok(false)` when the job exists but has already finished.
    pub fn cancel(&self, id: &JobId) -> WorkerResult<bool> {
        let record = self.query_status(id)?;
        if record.is_terminal() {
            return Ok(false);
        }

        let signalled = self
            .handles
            .get(id)
            .map(|handle| handle.cancel())
            .unwrap_or(false);
        if signalled {
            info!(job_id = %id, "Cancellation requested");
        }
        Ok(signalled)
    }

    /// Number of job tasks that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        self.reap_finished();
        self.handles.len()
    }

    /// Start the retention sweeper if a retention window is configured.
    pub fn spawn_retention_sweeper(&self) -> Option<JoinHandle<()>> {
        let retention = self.config.retention?;
        let sweeper = RetentionSweeper::new(Arc::clone(&self.store), retention, self.config.sweep_interval);
        let shutdown_rx = self.shutdown.subscribe();
        Some(tokio::spawn(async move {
            sweeper.run(shutdown_rx).await;
        }))
    }

    /// Stop accepting jobs, cancel everything in flight and wait for the
    /// tasks to record their terminal state, up to `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        // Repeat until no handles remain, picking up jobs registered by a
        // submit that raced the flag above
        let drain = async {
            loop {
                let tasks = self.cancel_all();
                if tasks.is_empty() {
                    return;
                }
                info!("Waiting for {} in-flight jobs to stop...", tasks.len());
                for task in tasks {
                    let _ = task.await;
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("Timed out after {:?} waiting for jobs to stop", timeout);
        }
    }

    /// Remove every handle, signal its cancellation and return the tasks.
    fn cancel_all(&self) -> Vec<JoinHandle<()>> {
        let ids: Vec<JobId> = self.handles.iter().map(|entry| entry.key().clone()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, handle)) = self.handles.remove(&id) {
                handle.cancel();
                tasks.push(handle.task);
            }
        }
        tasks
    }

    fn reap_finished(&self) {
        self.handles.retain(|_, handle| !handle.is_finished());
    }
}

/// Body of a job task: wait for admission, then run the pipeline.
async fn run_job(
    pipeline: Arc<JobPipeline>,
    admission: Option<Arc<Semaphore>>,
    id: JobId,
    input: PathBuf,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let _in_flight = InFlightGuard::new();
    let started = Instant::now();

    let _permit = match admission {
        Some(semaphore) => {
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = cancelled(&mut cancel_rx) => None,
            };
            match permit {
                Some(permit) => Some(permit),
                None => {
                    finish(&id, pipeline.cancel_before_start(&id), started);
                    return;
                }
            }
        }
        None => None,
    };

    let result = pipeline.run(&id, &input, cancel_rx).await;
    finish(&id, result, started);
}

fn finish(id: &JobId, result: WorkerResult<JobOutcome>, started: Instant) {
    match result {
        Ok(outcome) => metrics::record_job_finished(outcome, started.elapsed()),
        Err(e) => error!(job_id = %id, "Pipeline aborted: {}", e),
    }
}
