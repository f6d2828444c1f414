//! Job lifecycle tests against the executor façade.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};

use vprobe_media::{cancelled, FfmpegToolchain, MediaError, MediaResult, MediaToolchain};
use vprobe_models::{JobId, JobRecord, JobState};
use vprobe_store::JobStore;
use vprobe_worker::{JobExecutor, WorkerConfig, WorkerError};

const DECODE_LOG: &str = "[warning] foo\nok bar\ndecode error baz\n";

/// Toolchain whose behaviour is chosen by the input file name.
///
/// - `bad-inspect` in the name fails inspection
/// - `bad-decode` in the name fails the decode pass
///
/// With a gate, every stage waits for a permit (or cancellation) first.
struct ScriptedToolchain {
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedToolchain {
    fn instant() -> Arc<Self> {
        Arc::new(Self { gate: None })
    }

    fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Arc::new(Self {
                gate: Some(Arc::clone(&gate)),
            }),
            gate,
        )
    }

    async fn hold(&self, mut cancel_rx: watch::Receiver<bool>) -> MediaResult<()> {
        let Some(gate) = &self.gate else {
            tokio::task::yield_now().await;
            return Ok(());
        };
        tokio::select! {
            permit = gate.acquire() => {
                permit.map_err(|_| MediaError::internal("gate closed"))?.forget();
                Ok(())
            }
            _ = cancelled(&mut cancel_rx) => Err(MediaError::Cancelled),
        }
    }
}

#[async_trait]
impl MediaToolchain for ScriptedToolchain {
    async fn inspect(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String> {
        self.hold(cancel_rx).await?;
        if input.to_string_lossy().contains("bad-inspect") {
            return Err(MediaError::ffprobe_failed("invalid data", Some("moov atom not found".into()), Some(1)));
        }
        Ok(format!("{{\"format\":{{\"filename\":\"{}\"}}}}", input.display()))
    }

    async fn deep_analyze(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String> {
        self.hold(cancel_rx).await?;
        if input.to_string_lossy().contains("bad-decode") {
            return Err(MediaError::ffmpeg_failed("decode aborted", None, Some(69)));
        }
        Ok(DECODE_LOG.to_string())
    }
}

fn executor(config: WorkerConfig, toolchain: Arc<dyn MediaToolchain>) -> Arc<JobExecutor> {
    Arc::new(JobExecutor::new(config, Arc::new(JobStore::new()), toolchain))
}

async fn wait_for_terminal(executor: &JobExecutor, id: &JobId) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let record = executor.query_status(id).unwrap();
            if record.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state")
}

async fn wait_for_progress(executor: &JobExecutor, id: &JobId, progress: u8) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while executor.query_status(id).unwrap().progress < progress {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not reach the expected checkpoint")
}

#[tokio::test]
async fn test_submit_is_immediately_visible_as_processing() {
    let executor = executor(WorkerConfig::default(), ScriptedToolchain::instant());

    let id = executor.submit(PathBuf::from("uploads/upload-1.mp4")).unwrap();
    let record = executor.query_status(&id).unwrap();
    assert_eq!(record.state, JobState::Processing);
    assert_eq!(record.progress, 0);
    assert!(executor.query_log(&id).unwrap_err().is_not_found());

    let record = wait_for_terminal(&executor, &id).await;
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.progress, 100);
}

#[tokio::test]
async fn test_completed_job_has_filtered_summary_and_full_log() {
    let executor = executor(WorkerConfig::default(), ScriptedToolchain::instant());

    let id = executor.submit(PathBuf::from("uploads/upload-2.mp4")).unwrap();
    let record = wait_for_terminal(&executor, &id).await;

    assert_eq!(record.state, JobState::Completed);
    assert_eq!(
        record.diagnostic_summary.as_deref(),
        Some("[warning] foo\ndecode error baz")
    );
    assert!(record
        .analysis_summary
        .as_deref()
        .unwrap()
        .contains("upload-2.mp4"));

    let log = executor.query_log(&id).unwrap();
    assert_eq!(&*log, DECODE_LOG);
}

#[tokio::test]
async fn test_missing_input_fails_at_inspection_with_real_tools() {
    let executor = executor(WorkerConfig::default(), Arc::new(FfmpegToolchain::default()));

    let id = executor
        .submit(PathBuf::from("/nonexistent/vprobe/upload-missing.mp4"))
        .unwrap();
    let record = wait_for_terminal(&executor, &id).await;

    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.progress, 25);
    assert!(record.analysis_summary.is_none());
    assert!(record.diagnostic_summary.is_none());
    assert!(executor.query_log(&id).unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_decode_failure_freezes_progress_at_50() {
    let executor = executor(WorkerConfig::default(), ScriptedToolchain::instant());

    let id = executor.submit(PathBuf::from("uploads/bad-decode.mp4")).unwrap();
    let record = wait_for_terminal(&executor, &id).await;

    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.progress, 50);
    assert!(executor.query_log(&id).is_err());
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let executor = executor(WorkerConfig::default(), ScriptedToolchain::instant());
    let id = JobId::from("never-issued");

    assert!(matches!(executor.query_status(&id), Err(WorkerError::NotFound(_))));
    assert!(matches!(executor.query_log(&id), Err(WorkerError::NotFound(_))));
    assert!(matches!(executor.cancel(&id), Err(WorkerError::NotFound(_))));
}

#[tokio::test]
async fn test_progress_advances_through_checkpoints_in_order() {
    let (toolchain, gate) = ScriptedToolchain::gated();
    let executor = executor(WorkerConfig::default(), toolchain);

    let id = executor.submit(PathBuf::from("uploads/upload-3.mp4")).unwrap();
    wait_for_progress(&executor, &id, 25).await;
    let record = executor.query_status(&id).unwrap();
    assert_eq!((record.state, record.progress), (JobState::Processing, 25));

    gate.add_permits(1);
    wait_for_progress(&executor, &id, 50).await;
    let record = executor.query_status(&id).unwrap();
    assert_eq!((record.state, record.progress), (JobState::Processing, 50));
    assert!(record.analysis_summary.is_none());

    gate.add_permits(1);
    let record = wait_for_terminal(&executor, &id).await;
    assert_eq!((record.state, record.progress), (JobState::Completed, 100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_stay_consistent() {
    let executor = executor(WorkerConfig::default(), ScriptedToolchain::instant());

    let submitters: Vec<_> = (0..50)
        .map(|i| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                let name = match i % 5 {
                    0 => format!("uploads/bad-inspect-{}.mp4", i),
                    1 => format!("uploads/bad-decode-{}.mp4", i),
                    _ => format!("uploads/upload-{}.mp4", i),
                };
                executor.submit(PathBuf::from(name)).unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for submitter in submitters {
        ids.push(submitter.await.unwrap());
    }
    let distinct: HashSet<_> = ids.iter().cloned().collect();
    assert_eq!(distinct.len(), 50);

    // Poll every job until all are terminal, checking each snapshot
    let mut last_progress = vec![0u8; ids.len()];
    let mut terminal = vec![false; ids.len()];
    tokio::time::timeout(Duration::from_secs(20), async {
        while terminal.iter().any(|done| !done) {
            for (i, id) in ids.iter().enumerate() {
                let record = executor.query_status(id).unwrap();
                assert!(record.is_consistent(), "inconsistent snapshot: {:?}", record);
                assert!(record.progress >= last_progress[i], "progress regressed for {}", id);
                if terminal[i] {
                    assert!(record.is_terminal(), "job {} left a terminal state", id);
                }
                last_progress[i] = record.progress;
                terminal[i] = record.is_terminal();
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("jobs did not finish");

    for id in &ids {
        let record = executor.query_status(id).unwrap();
        match record.state {
            JobState::Completed => {
                assert_eq!(record.progress, 100);
                assert!(!executor.query_log(id).unwrap().is_empty());
            }
            JobState::Failed => {
                assert!(record.progress == 25 || record.progress == 50);
                assert!(executor.query_log(id).is_err());
            }
            other => panic!("unexpected state {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_admission_limit_reports_queued_jobs() {
    let (toolchain, gate) = ScriptedToolchain::gated();
    let executor = executor(WorkerConfig::default().with_max_concurrent_jobs(1), toolchain);

    let first = executor.submit(PathBuf::from("uploads/first.mp4")).unwrap();
    let second = executor.submit(PathBuf::from("uploads/second.mp4")).unwrap();
    assert_eq!(executor.query_status(&first).unwrap().state, JobState::Queued);

    wait_for_progress(&executor, &first, 25).await;
    let waiting = executor.query_status(&second).unwrap();
    assert_eq!((waiting.state, waiting.progress), (JobState::Queued, 0));

    gate.add_permits(4);
    assert_eq!(wait_for_terminal(&executor, &first).await.state, JobState::Completed);
    assert_eq!(wait_for_terminal(&executor, &second).await.state, JobState::Completed);
}

#[tokio::test]
async fn test_cancel_running_job() {
    let (toolchain, _gate) = ScriptedToolchain::gated();
    let executor = executor(WorkerConfig::default(), toolchain);

    let id = executor.submit(PathBuf::from("uploads/long.mp4")).unwrap();
    wait_for_progress(&executor, &id, 25).await;

    assert!(executor.cancel(&id).unwrap());
    let record = wait_for_terminal(&executor, &id).await;
    assert_eq!((record.state, record.progress), (JobState::Failed, 25));
    assert!(!executor.cancel(&id).unwrap());
}

#[tokio::test]
async fn test_cancel_queued_job_never_starts() {
    let (toolchain, gate) = ScriptedToolchain::gated();
    let executor = executor(WorkerConfig::default().with_max_concurrent_jobs(1), toolchain);

    let running = executor.submit(PathBuf::from("uploads/running.mp4")).unwrap();
    let queued = executor.submit(PathBuf::from("uploads/queued.mp4")).unwrap();
    wait_for_progress(&executor, &running, 25).await;

    assert!(executor.cancel(&queued).unwrap());
    let record = wait_for_terminal(&executor, &queued).await;
    assert_eq!((record.state, record.progress), (JobState::Failed, 0));

    gate.add_permits(2);
    assert_eq!(wait_for_terminal(&executor, &running).await.state, JobState::Completed);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_and_rejects_new_jobs() {
    let (toolchain, _gate) = ScriptedToolchain::gated();
    let executor = executor(WorkerConfig::default(), toolchain);

    let id = executor.submit(PathBuf::from("uploads/stuck.mp4")).unwrap();
    wait_for_progress(&executor, &id, 25).await;
    assert_eq!(executor.active_jobs(), 1);

    executor.shutdown(Duration::from_secs(5)).await;

    let record = executor.query_status(&id).unwrap();
    assert_eq!(record.state, JobState::Failed);
    assert_eq!(executor.active_jobs(), 0);
    assert!(matches!(
        executor.submit(PathBuf::from("uploads/late.mp4")),
        Err(WorkerError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_retention_sweeper_evicts_finished_jobs() {
    let config = WorkerConfig {
        retention: Some(Duration::from_millis(1)),
        sweep_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    };
    let executor = executor(config, ScriptedToolchain::instant());

    let id = executor.submit(PathBuf::from("uploads/short-lived.mp4")).unwrap();
    wait_for_terminal(&executor, &id).await;

    let sweeper = executor.spawn_retention_sweeper().expect("retention configured");
    tokio::time::timeout(Duration::from_secs(5), async {
        while executor.query_status(&id).is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job was not evicted");

    executor.shutdown(Duration::from_secs(1)).await;
    tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submissions_racing_shutdown_are_all_stopped() {
    for _ in 0..20 {
        let (toolchain, _gate) = ScriptedToolchain::gated();
        let executor = executor(WorkerConfig::default(), toolchain);

        let submitters: Vec<_> = (0..8)
            .map(|i| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move { executor.submit(PathBuf::from(format!("uploads/race-{}.mp4", i))).ok() })
            })
            .collect();
        executor.shutdown(Duration::from_secs(5)).await;

        for submitter in submitters {
            // Jobs are held at the gate, so only a cancellation can finish them
            if let Some(id) = submitter.await.unwrap() {
                let record = wait_for_terminal(&executor, &id).await;
                assert_eq!(record.state, JobState::Failed);
            }
        }
    }
}

#[tokio::test]
async fn test_retention_sweeper_spawned_after_shutdown_exits() {
    let config = WorkerConfig::default().with_retention(Duration::from_secs(60));
    let executor = executor(config, ScriptedToolchain::instant());
    executor.shutdown(Duration::from_secs(1)).await;

    let sweeper = executor.spawn_retention_sweeper().expect("retention configured");
    tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .expect("sweeper kept running after shutdown")
        .unwrap();
}
