//! Batch capture sessions.
//!
//! [`BatchController`] is the single entry point UIs drive: [`start_batch`],
//! [`export_archive`], [`clear_all`] and [`cancel`]. Everything a UI shows (status text,
//! progress, running flag, total sample count) is published through a
//! [`tokio::sync::watch`] channel of [`CaptureReport`]s.
//!
//! Only one session runs at a time. The guard is an explicit lock held while a session
//! captures and stores, so two sessions can never interleave their per-label ordinal reads
//! and writes. It is released before the brief `Completed` display, and also when the
//! `start_batch` future is dropped mid-session.
//!
//! [`start_batch`]: BatchController::start_batch
//! [`export_archive`]: BatchController::export_archive
//! [`clear_all`]: BatchController::clear_all
//! [`cancel`]: BatchController::cancel

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::export::{ArchiveExporter, ExportedArchive};
use crate::landmarks::LandmarkSource;
use crate::sampler::{SequenceCapture, SequenceSampler};
use crate::store::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Capturing sample `current` of `total` (1-based).
    Running { current: u32, total: u32 },
    /// All iterations done; shown briefly before returning to `Idle`.
    Completed,
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub state: SessionState,
    pub status: String,
    /// Fraction in `[0, 1]`.
    pub progress: f32,
    pub total_samples: usize,
}

impl CaptureReport {
    fn idle(total_samples: usize) -> Self {
        Self {
            state: SessionState::Idle,
            status: "Idle".to_string(),
            progress: 0.0,
            total_samples,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running { .. })
    }
}

/// Outcome of a finished (or cancelled) batch session.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub label: String,
    /// Filenames of the samples committed by this session, in capture order.
    pub filenames: Vec<String>,
    /// Store-wide sample count after the session.
    pub total_samples: usize,
    pub cancelled: bool,
}

fn publish_when_idle(
    report: &watch::Sender<CaptureReport>,
    status: Option<String>,
    progress: f32,
) {
    report.send_if_modified(|r| {
        if r.state != SessionState::Idle {
            return false;
        }
        if let Some(status) = status {
            r.status = status;
        }
        r.progress = progress;
        true
    });
}

/// Trims `label` and checks it can be used as a filename stem.
pub fn validate_label(label: &str) -> Result<String, CollectorError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(CollectorError::Validation(
            "gesture label must not be empty".to_string(),
        ));
    }
    if label.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(CollectorError::Validation(format!(
            "gesture label {label:?} contains a path separator or control character"
        )));
    }
    Ok(label.to_string())
}

pub struct BatchController {
    store: SampleStore,
    capture: Arc<dyn SequenceCapture>,
    exporter: ArchiveExporter,
    config: CollectorConfig,
    session: Mutex<()>,
    /// Set exactly while a [`SessionGuard`] holds `session`.
    active: AtomicBool,
    /// Bumped per batch session so a lingering session never resets a newer one's report.
    generation: AtomicU64,
    cancel_requested: AtomicBool,
    report: Arc<watch::Sender<CaptureReport>>,
}

/// One batch session's hold on the controller.
///
/// Dropping it frees the session lock and, unless a newer session has started, puts the
/// report back to `Idle`. That also covers a `start_batch` future dropped mid-session.
struct SessionGuard<'a> {
    controller: &'a BatchController,
    lock: Option<MutexGuard<'a, ()>>,
    generation: u64,
}

impl<'a> SessionGuard<'a> {
    fn begin(controller: &'a BatchController, lock: MutexGuard<'a, ()>) -> Self {
        let generation = controller.generation.fetch_add(1, Ordering::SeqCst) + 1;
        controller.active.store(true, Ordering::SeqCst);
        Self {
            controller,
            lock: Some(lock),
            generation,
        }
    }

    /// Lets other sessions start while this one is only displaying its outcome.
    fn release(&mut self) {
        if self.lock.take().is_some() {
            self.controller.active.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let interrupted = self.lock.is_some();
        self.release();
        if self.controller.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }
        self.controller.report.send_if_modified(|r| {
            if r.state == SessionState::Idle {
                return false;
            }
            if interrupted {
                warn!("batch session dropped before finishing");
            }
            r.state = SessionState::Idle;
            r.status = if interrupted { "Session interrupted" } else { "Idle" }.to_string();
            r.progress = 0.0;
            true
        });
    }
}

impl std::fmt::Debug for BatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchController")
            .field("store", &self.store)
            .field("exporter", &self.exporter)
            .field("config", &self.config)
            .field("report", &*self.report.borrow())
            .finish()
    }
}

impl BatchController {
    pub fn new(
        store: SampleStore,
        capture: Arc<dyn SequenceCapture>,
        exporter: ArchiveExporter,
        config: CollectorConfig,
    ) -> Result<Self, CollectorError> {
        let total = store.len()?;
        let (report, _) = watch::channel(CaptureReport::idle(total));
        Ok(Self {
            store,
            capture,
            exporter,
            config,
            session: Mutex::new(()),
            active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cancel_requested: AtomicBool::new(false),
            report: Arc::new(report),
        })
    }

    /// Opens the store named by `config` and samples `source` at the configured cadence.
    pub fn open(
        config: CollectorConfig,
        source: Arc<dyn LandmarkSource>,
    ) -> Result<Self, CollectorError> {
        let store = SampleStore::open(&config.dataset_path)?;
        let sampler = SequenceSampler::new(source, config.frame_interval());
        let exporter = ArchiveExporter::new(store.clone(), config.export_dir.clone());
        Self::new(store, Arc::new(sampler), exporter, config)
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureReport> {
        self.report.subscribe()
    }

    pub fn report(&self) -> CaptureReport {
        self.report.borrow().clone()
    }

    /// True while a batch session holds the controller (capturing or storing).
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn publish(&self, update: impl FnOnce(&mut CaptureReport)) {
        self.report.send_modify(update);
    }

    fn cancel_pending(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Captures `count` samples labeled `label`, one after another.
    ///
    /// Validation failures and calls made while another session runs return an error
    /// without touching the store or the report. A storage failure stops the session;
    /// samples committed before it stay in the store.
    ///
    /// After a finished session the report shows `Completed` for the configured linger.
    /// The session lock is already released then, so a new batch may start right away.
    #[instrument(skip(self, label), fields(label = %label.trim()))]
    pub async fn start_batch(
        &self,
        label: &str,
        count: u32,
    ) -> Result<BatchSummary, CollectorError> {
        let label = validate_label(label)?;
        if count == 0 || count > self.config.max_batch {
            return Err(CollectorError::Validation(format!(
                "batch size must be between 1 and {}, got {count}",
                self.config.max_batch
            )));
        }

        let Ok(lock) = self.session.try_lock() else {
            warn!("batch requested while another session is running");
            return Err(CollectorError::Busy);
        };
        let mut session = SessionGuard::begin(self, lock);
        self.cancel_requested.store(false, Ordering::SeqCst);
        info!("batch session started");

        match self.run_batch(&label, count).await {
            Ok(summary) => {
                let status = if summary.cancelled {
                    "Batch cancelled"
                } else {
                    "Batch complete"
                };
                self.publish(|r| {
                    r.state = SessionState::Completed;
                    r.status = status.to_string();
                    r.total_samples = summary.total_samples;
                });
                info!(
                    captured = summary.filenames.len(),
                    total = summary.total_samples,
                    cancelled = summary.cancelled,
                    "batch session finished"
                );

                session.release();
                tokio::time::sleep(self.config.completed_linger()).await;
                // Back to Idle, unless a newer session took over during the linger.
                drop(session);
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "batch session aborted");
                let total = self.store.len().ok();
                self.publish(|r| {
                    r.state = SessionState::Idle;
                    r.status = format!("Error: {err}");
                    r.progress = 0.0;
                    if let Some(total) = total {
                        r.total_samples = total;
                    }
                });
                Err(err)
            }
        }
    }

    async fn run_batch(&self, label: &str, count: u32) -> Result<BatchSummary, CollectorError> {
        let mut filenames = Vec::with_capacity(count as usize);
        let mut cancelled = false;

        self.publish(|r| r.progress = 0.0);

        for i in 1..=count {
            if self.cancel_pending() {
                cancelled = true;
                break;
            }
            self.publish(|r| {
                r.state = SessionState::Running {
                    current: i,
                    total: count,
                };
                r.status = format!("Capturing {i} / {count}");
            });

            let frames = self.capture.capture_sequence().await;
            if self.cancel_pending() {
                debug!(iteration = i, "discarding sequence sampled after cancel");
                cancelled = true;
                break;
            }

            let existing = self.store.count_by_label(label)?;
            let sample = self.store.append(label, frames).await?;
            debug!(
                iteration = i,
                ordinal = existing + 1,
                filename = %sample.filename,
                "sample stored"
            );
            filenames.push(sample.filename);

            tokio::time::sleep(self.config.sample_pause()).await;
            self.publish(|r| {
                r.progress = i as f32 / count as f32;
                r.total_samples += 1;
            });
        }

        Ok(BatchSummary {
            label: label.to_string(),
            filenames,
            total_samples: self.store.len()?,
            cancelled,
        })
    }

    /// Asks a running session to stop after its current step. Returns `false` when idle.
    ///
    /// A sequence sampled after the request is dropped; samples already stored stay.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        info!("batch cancellation requested");
        true
    }

    /// Deletes every stored sample. Refused while a session runs.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<(), CollectorError> {
        let Ok(_session) = self.session.try_lock() else {
            warn!("clear requested while a session is running");
            return Err(CollectorError::Busy);
        };

        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "clearing the store failed");
            self.publish(|r| r.status = format!("Error: {err}"));
            return Err(err.into());
        }

        self.publish(|r| {
            *r = CaptureReport::idle(0);
            r.status = "Database cleared".to_string();
        });
        Ok(())
    }

    /// Writes every stored sample into one archive in the configured export directory.
    ///
    /// Takes no session lock. Progress is only mirrored into the report while idle so it
    /// never overwrites a running batch's progress.
    #[instrument(skip(self))]
    pub async fn export_archive(&self) -> Result<ExportedArchive, CollectorError> {
        publish_when_idle(&self.report, Some("Exporting...".to_string()), 0.0);
        let report = Arc::clone(&self.report);
        let progress = move |p: f32| publish_when_idle(&report, None, p);

        match self.exporter.export(progress).await {
            Ok(archive) => {
                publish_when_idle(
                    &self.report,
                    Some(format!("Exported {}", archive.file_name)),
                    0.0,
                );
                Ok(archive)
            }
            Err(err) => {
                warn!(error = %err, "export failed");
                publish_when_idle(&self.report, Some(format!("Error: {err}")), 0.0);
                Err(err)
            }
        }
    }
}
