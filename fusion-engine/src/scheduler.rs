//! The cycle scheduler: fetch, derive, score, retry, persist, sleep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use fusion_sources::ReadingCollector;
use fusion_types::{format_duration, CycleSnapshot, Profile};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::dashboard::warning_line;
use crate::integrity::IntegrityScorer;
use crate::pipeline::{AlignmentStage, ModulePipeline};
use crate::recovery::{AutorecoveryController, Decision, RetryState};
use crate::status::{Phase, SchedulerStatus, StatusCell};
use crate::writer::{Persisted, SnapshotWriter};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// An attempt met the integrity threshold.
    Accepted,
    /// Retries ran out; the best attempt was published.
    Exhausted,
    /// A stop arrived during a retry backoff; the best attempt was published.
    Interrupted,
}

/// Result of one cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// The published snapshot.
    pub snapshot: CycleSnapshot,
    /// Fetch attempts made, including the first.
    pub attempts: u32,
    pub resolution: Resolution,
    pub persisted: Persisted,
}

/// Runs cycles for one instrument.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use fusion_engine::CycleScheduler;
/// use fusion_sources::{Credentials, SourceFetcher};
/// use fusion_types::Profile;
///
/// # async fn run(profile: Profile) -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = SourceFetcher::new(&profile, &Credentials::from_env())?;
/// let scheduler = CycleScheduler::builder(Arc::new(profile), Arc::new(fetcher)).build();
///
/// let handle = scheduler.start();
/// tokio::signal::ctrl_c().await?;
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct CycleScheduler {
    profile: Arc<Profile>,
    collector: Arc<dyn ReadingCollector>,
    pipeline: ModulePipeline,
    scorer: IntegrityScorer,
    recovery: AutorecoveryController,
    writer: SnapshotWriter,
    status: Arc<StatusCell>,
}

impl CycleScheduler {
    pub fn builder(
        profile: Arc<Profile>,
        collector: Arc<dyn ReadingCollector>,
    ) -> CycleSchedulerBuilder {
        CycleSchedulerBuilder {
            profile,
            collector,
            alignment: None,
            writer: None,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.snapshot()
    }

    /// Run a single cycle to completion.
    pub async fn run_once(&self) -> CycleOutcome {
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        self.run_cycle(&mut stop_rx).await
    }

    /// Run one cycle, retrying low-integrity attempts as the recovery policy
    /// allows, then persist the accepted or best attempt.
    ///
    /// Retry warnings go to the rolling log as soon as the retry is
    /// scheduled; the cycle block only repeats how the cycle ended.
    ///
    /// A stop signal cuts a pending backoff short; an in-flight fetch is
    /// always allowed to settle.
    pub async fn run_cycle(&self, stop: &mut watch::Receiver<bool>) -> CycleOutcome {
        let symbol = self.profile.symbol.as_str();
        let max_retries = self.recovery.policy().max_retries;
        let mut state = RetryState::new();
        let mut best: Option<CycleSnapshot> = None;
        let mut warnings = Vec::new();
        let mut attempts = 0u32;

        let (published, resolution) = loop {
            attempts += 1;
            let candidate = self.attempt().await;
            let score = candidate.integrity_score;
            info!(symbol, attempt = attempts, integrity = score, "Attempt scored");

            let decision = self.recovery.assess(&mut state, score, Utc::now());

            // Highest integrity wins; the later attempt wins a tie.
            let best_so_far = match best.take() {
                Some(previous) if previous.integrity_score > score => previous,
                _ => candidate,
            };

            match decision {
                Decision::Publish => break (best_so_far, Resolution::Accepted),
                Decision::Exhausted => {
                    let message = format!(
                        "Retries exhausted ({}); publishing best attempt ({:.2})",
                        max_retries, best_so_far.integrity_score
                    );
                    warn!(symbol, integrity = score, "{}", message);
                    warnings.push(message);
                    break (best_so_far, Resolution::Exhausted);
                }
                Decision::Retry { attempt, backoff } => {
                    let message = format!(
                        "Data integrity low ({:.2}), retrying in {} (attempt {}/{})",
                        score,
                        format_duration(backoff),
                        attempt,
                        max_retries
                    );
                    warn!(symbol, integrity = score, attempt, "{}", message);
                    let line = format!("{}\n", warning_line(&message));
                    if let Err(e) = self.writer.append_log(&line).await {
                        error!(symbol, error = %e, "Failed to append to log");
                    }

                    self.status.set_phase(Phase::Retrying { attempt });
                    if sleep_or_stop(backoff, stop).await {
                        let message = "Stop requested; publishing best attempt".to_string();
                        info!(symbol, "{}", message);
                        warnings.push(message);
                        break (best_so_far, Resolution::Interrupted);
                    }
                    best = Some(best_so_far);
                }
            }
        };

        self.status.set_phase(Phase::Publishing);
        let persisted = self.writer.persist(&published, &warnings).await;
        info!(
            symbol,
            attempts,
            integrity = published.integrity_score,
            resolution = ?resolution,
            "Cycle complete"
        );

        self.status.update(|s| {
            s.phase = Phase::Idle;
            s.cycles_completed += 1;
            s.last_integrity = Some(published.integrity_score);
            s.last_artifact = persisted.artifact.clone();
            s.last_cycle_at = Some(published.timestamp);
        });

        CycleOutcome {
            snapshot: published,
            attempts,
            resolution,
            persisted,
        }
    }

    /// Start the cycle loop on the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(self.run(stop_rx));

        SchedulerHandle {
            stop_tx,
            status,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let symbol = self.profile.symbol.as_str();
        let interval = self.profile.schedule.interval;
        info!(symbol, interval = %interval, "Scheduler started");

        while !is_stopped(&stop) {
            self.run_cycle(&mut stop).await;
            if is_stopped(&stop) {
                break;
            }

            let next = chrono::Duration::from_std(interval.to_duration())
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));
            self.status.update(|s| s.next_cycle_at = next);

            info!(symbol, "Sleeping for {}", interval);
            if let Err(e) = self
                .writer
                .append_log(&format!("Sleeping for {}...\n", interval))
                .await
            {
                error!(symbol, error = %e, "Failed to append to log");
            }

            if sleep_or_stop(interval.to_duration(), &mut stop).await {
                break;
            }
        }

        self.status.update(|s| {
            s.phase = Phase::Stopped;
            s.next_cycle_at = None;
        });
        info!(symbol, "Scheduler stopped");
    }

    /// Fetch, derive and score once.
    async fn attempt(&self) -> CycleSnapshot {
        self.status.set_phase(Phase::Fetching);
        let readings = self.collector.collect().await;
        for reading in readings.iter().filter(|r| !r.is_present()) {
            debug!(
                source = %reading.source,
                error = reading.error.as_deref().unwrap_or("missing"),
                "Reading unavailable"
            );
        }

        self.status.set_phase(Phase::Deriving);
        // artifacts carry microseconds
        let at = Utc::now().trunc_subsecs(6);
        let modules = self.pipeline.derive(&readings, at);

        self.status.set_phase(Phase::Scoring);
        let score = self.scorer.score(&readings);

        modules
            .into_iter()
            .fold(CycleSnapshot::builder(at).integrity_score(score), |b, m| {
                b.module(m)
            })
            .build()
    }
}

/// Builder for [`CycleScheduler`].
pub struct CycleSchedulerBuilder {
    profile: Arc<Profile>,
    collector: Arc<dyn ReadingCollector>,
    alignment: Option<Arc<dyn AlignmentStage>>,
    writer: Option<SnapshotWriter>,
}

impl CycleSchedulerBuilder {
    /// Replace the static M4 alignment.
    pub fn alignment(mut self, alignment: Arc<dyn AlignmentStage>) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Use a writer other than the profile's `[output]`.
    pub fn writer(mut self, writer: SnapshotWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn build(self) -> CycleScheduler {
        let mut pipeline = ModulePipeline::new(Arc::clone(&self.profile));
        if let Some(alignment) = self.alignment {
            pipeline = pipeline.with_alignment(alignment);
        }
        let writer = self
            .writer
            .unwrap_or_else(|| SnapshotWriter::from_profile(&self.profile));

        CycleScheduler {
            scorer: IntegrityScorer::from_profile(&self.profile),
            recovery: AutorecoveryController::new(self.profile.recovery.clone()),
            profile: self.profile,
            collector: self.collector,
            pipeline,
            writer,
            status: Arc::new(StatusCell::default()),
        }
    }
}

/// Handle to a running scheduler.
///
/// Dropping the handle also stops the scheduler at its next checkpoint.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    status: Arc<StatusCell>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        self.status.snapshot()
    }

    /// Ask the scheduler to stop. The in-flight cycle still completes.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the scheduler task to exit.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.stop();
        self.task.await
    }
}

fn is_stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration`; true if a stop arrived first.
async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if is_stopped(stop) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop_requested(stop) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use fusion_types::{HumanDuration, ModuleId, Readings};
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{btcusd_profile, readings};

    struct ScriptedCollector {
        script: Mutex<VecDeque<Readings>>,
        fallback: Readings,
        calls: AtomicU32,
        notify: Option<mpsc::UnboundedSender<u32>>,
    }

    impl ScriptedCollector {
        fn new(script: Vec<Readings>, fallback: Readings) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                notify: None,
            }
        }

        fn notifying(mut self) -> (Self, mpsc::UnboundedReceiver<u32>) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.notify = Some(tx);
            (self, rx)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReadingCollector for ScriptedCollector {
        async fn collect(&self) -> Readings {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(tx) = &self.notify {
                let _ = tx.send(n);
            }
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn full() -> Readings {
        readings(&[
            ("BTC", Some(97_000.0)),
            ("ETH", Some(3_500.0)),
            ("DXY", Some(108.0)),
            ("VIX", Some(15.0)),
            ("fear_greed", Some(60.0)),
        ])
    }

    fn only(id: &str) -> Readings {
        readings(&[(id, Some(1.0))])
    }

    fn profile(dir: &Path, backoff: HumanDuration, max_retries: u32, threshold: f64) -> Profile {
        let mut profile = btcusd_profile();
        profile.output.directory = dir.to_path_buf();
        profile.recovery.backoff = backoff;
        profile.recovery.max_retries = max_retries;
        profile.recovery.threshold = threshold;
        profile
    }

    fn json_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".json")
            })
            .count()
    }

    #[tokio::test]
    async fn test_first_attempt_accepted() {
        let tmp = TempDir::new().unwrap();
        let collector = Arc::new(ScriptedCollector::new(vec![], full()));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let outcome = scheduler.run_once().await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.snapshot.integrity_score, 1.0);
        assert_eq!(outcome.snapshot.len(), 7);
        assert!(outcome.persisted.is_complete());
        assert_eq!(collector.calls(), 1);

        let status = scheduler.status();
        assert_eq!(status.phase, Phase::Idle);
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.last_integrity, Some(1.0));
        assert_eq!(status.last_artifact, outcome.persisted.artifact);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_accepted() {
        let tmp = TempDir::new().unwrap();
        let collector = Arc::new(ScriptedCollector::new(
            vec![only("BTC"), only("ETH")],
            full(),
        ));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let started = tokio::time::Instant::now();
        let outcome = scheduler.run_once().await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.snapshot.integrity_score, 1.0);
        assert!(started.elapsed() >= Duration::from_secs(1200));

        // retried attempts are not persisted
        assert_eq!(json_files(tmp.path()), 1);
        let log = std::fs::read_to_string(tmp.path().join("FUSION_LOG.txt")).unwrap();
        assert_eq!(log.matches("WARNING: Data integrity low (0.25)").count(), 2);
        assert!(log.contains("retrying in 10m (attempt 2/3)"));
        // logged ahead of the block that publishes the cycle
        let header = log.find("BTCUSD Fusion Cycle - ").unwrap();
        let last_warning = log.rfind("WARNING: Data integrity low").unwrap();
        assert!(last_warning < header);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_publishes_best() {
        let tmp = TempDir::new().unwrap();
        let half = readings(&[("BTC", Some(1.0)), ("ETH", Some(1.0))]);
        let collector = Arc::new(ScriptedCollector::new(vec![half], only("BTC")));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(60), 2, 0.9)),
            collector.clone(),
        )
        .build();

        let outcome = scheduler.run_once().await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.resolution, Resolution::Exhausted);
        assert_eq!(outcome.snapshot.integrity_score, 0.5);
        assert_eq!(
            outcome.snapshot.output(ModuleId::M1, "ETH"),
            Some(&fusion_types::OutputValue::Number(1.0))
        );
        assert_eq!(scheduler.status().last_integrity, Some(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_attempt_wins_tie() {
        let tmp = TempDir::new().unwrap();
        let collector = Arc::new(ScriptedCollector::new(
            vec![only("BTC"), only("ETH")],
            full(),
        ));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(60), 1, 0.9)),
            collector,
        )
        .build();

        let outcome = scheduler.run_once().await;

        assert_eq!(outcome.resolution, Resolution::Exhausted);
        assert!(outcome
            .snapshot
            .output(ModuleId::M1, "BTC")
            .unwrap()
            .is_null());
        assert_eq!(outcome.snapshot.integrity_score, 0.25);
    }

    #[tokio::test]
    async fn test_stop_interrupts_retry_backoff() {
        let tmp = TempDir::new().unwrap();
        let (collector, mut calls) =
            ScriptedCollector::new(vec![], only("BTC")).notifying();
        let collector = Arc::new(collector);
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(3600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let handle = scheduler.start();
        assert_eq!(calls.recv().await, Some(1));
        handle.stop();

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(collector.calls(), 1);
        assert_eq!(json_files(tmp.path()), 1);
        let log = std::fs::read_to_string(tmp.path().join("FUSION_LOG.txt")).unwrap();
        assert!(log.contains("Data integrity score: 0.25"));
    }

    #[tokio::test]
    async fn test_retry_warning_logged_during_backoff() {
        let tmp = TempDir::new().unwrap();
        let collector = Arc::new(ScriptedCollector::new(vec![], only("BTC")));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(3600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let handle = scheduler.start();
        for _ in 0..500 {
            if handle.status().phase == (Phase::Retrying { attempt: 1 }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.status().phase, Phase::Retrying { attempt: 1 });

        // nothing published yet, but the warning is already on disk
        assert_eq!(json_files(tmp.path()), 0);
        let log = std::fs::read_to_string(tmp.path().join("FUSION_LOG.txt")).unwrap();
        assert_eq!(
            log,
            "WARNING: Data integrity low (0.25), retrying in 1h (attempt 1/3)\n"
        );

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let log = std::fs::read_to_string(tmp.path().join("FUSION_LOG.txt")).unwrap();
        assert_eq!(log.matches("retrying in 1h (attempt 1/3)").count(), 1);
        assert!(log.contains("WARNING: Stop requested; publishing best attempt"));
        assert_eq!(collector.calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_interval_sleep() {
        let tmp = TempDir::new().unwrap();
        let collector = Arc::new(ScriptedCollector::new(vec![], full()));
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let handle = scheduler.start();
        for _ in 0..500 {
            if handle.status().next_cycle_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.status().cycles_completed, 1);

        let status = Arc::clone(&handle.status);
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let status = status.snapshot();
        assert_eq!(status.phase, Phase::Stopped);
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.next_cycle_at, None);
        assert_eq!(collector.calls(), 1);

        let log = std::fs::read_to_string(tmp.path().join("FUSION_LOG.txt")).unwrap();
        assert!(log.contains("Sleeping for 4h..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_cycle_after_interval() {
        let tmp = TempDir::new().unwrap();
        let (collector, mut calls) = ScriptedCollector::new(vec![], full()).notifying();
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(600), 3, 0.5)),
            Arc::new(collector),
        )
        .build();

        let started = tokio::time::Instant::now();
        let handle = scheduler.start();
        assert_eq!(calls.recv().await, Some(1));
        assert_eq!(calls.recv().await, Some(2));
        assert!(started.elapsed() >= Duration::from_secs(4 * 3600));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_scheduler() {
        let tmp = TempDir::new().unwrap();
        let (collector, mut calls) = ScriptedCollector::new(vec![], full()).notifying();
        let collector = Arc::new(collector);
        let scheduler = CycleScheduler::builder(
            Arc::new(profile(tmp.path(), HumanDuration::from_secs(600), 3, 0.5)),
            collector.clone(),
        )
        .build();

        let status = Arc::clone(&scheduler.status);
        let handle = scheduler.start();
        assert_eq!(calls.recv().await, Some(1));
        drop(handle);

        for _ in 0..500 {
            if status.snapshot().phase == Phase::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status.snapshot().phase, Phase::Stopped);
        assert_eq!(collector.calls(), 1);
    }
}
