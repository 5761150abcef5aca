// Timer-driven pass execution with a single-writer guarantee.
//
// At most one pass runs at a time: scheduled ticks queue on the pass gate,
// manual triggers are rejected outright while a pass is in flight. `stop`
// signals the loop and then joins it, so a stopped scheduler is observed
// only after any in-flight pass has finished.

use crate::config::SyncSettings;
use crate::conflict::{ConflictEntry, DefaultResolution, ResolutionPolicy};
use crate::engine::{ReconciliationEngine, SyncMode, SyncStatus};
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::history::{HistoryLog, HistoryStats};
use crate::report::ReportStore;
use crate::rules::RuleStore;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Combined snapshot for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub running: bool,
    pub connected: bool,
    pub interval_secs: u64,
    pub mode: SyncMode,
    pub pending_conflicts: usize,
    pub rule_count: usize,
    pub history: HistoryStats,
}

struct Shared {
    engine: Mutex<ReconciliationEngine>,
    rules: Mutex<RuleStore>,
    history: Mutex<HistoryLog>,
    reports: ReportStore,
    settings: Mutex<SyncSettings>,
    /// Serializes passes; manual triggers use try-lock so an in-flight
    /// pass rejects them instead of queueing behind it.
    pass_gate: Arc<Mutex<()>>,
    running: AtomicBool,
    connected: AtomicBool,
    events: EventBus,
}

pub struct Scheduler {
    inner: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(
        mut engine: ReconciliationEngine,
        rules: RuleStore,
        history: HistoryLog,
        reports: ReportStore,
        settings: SyncSettings,
    ) -> Self {
        engine.set_default_resolution(settings.default_resolution);
        Self {
            inner: Arc::new(Shared {
                engine: Mutex::new(engine),
                rules: Mutex::new(rules),
                history: Mutex::new(history),
                reports,
                settings: Mutex::new(settings),
                pass_gate: Arc::new(Mutex::new(())),
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                events: EventBus::new(),
            }),
            handle: Mutex::new(None),
            stop_tx: Mutex::new(None),
        }
    }

    /// Mark the object store connection as established. Passes are refused
    /// until this is set.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Start the periodic loop: one pass immediately, then one per interval
    /// tick. The interval is re-read each tick so setting changes apply
    /// without a restart.
    pub async fn start(&self) -> Result<()> {
        self.require_connected()?;
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }

        let (tx, mut rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            scheduled_pass(&inner).await;
            loop {
                let interval = inner.settings.lock().await.interval();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => scheduled_pass(&inner).await,
                    _ = rx.changed() => break,
                }
            }
            inner.running.store(false, Ordering::SeqCst);
        });

        *self.stop_tx.lock().await = Some(tx);
        *self.handle.lock().await = Some(handle);
        self.inner.events.emit(SyncEvent::ScheduleStateChanged(true));
        tracing::info!("scheduler started");
        Ok(())
    }

    /// Signal the loop and wait for it to exit. Returns only after any
    /// in-flight pass has completed.
    pub async fn stop(&self) -> Result<()> {
        let Some(tx) = self.stop_tx.lock().await.take() else {
            return Err(SyncError::NotRunning);
        };
        let _ = tx.send(true);

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner
            .events
            .emit(SyncEvent::ScheduleStateChanged(false));
        tracing::info!("scheduler stopped");
        Ok(())
    }

    /// Fire one pass on a background task. Rejected while another pass is
    /// in flight.
    pub async fn trigger_manual(&self) -> Result<()> {
        self.require_connected()?;
        let guard = Arc::clone(&self.inner.pass_gate)
            .try_lock_owned()
            .map_err(|_| SyncError::PassInFlight)?;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            execute_pass(&inner).await;
        });
        Ok(())
    }

    /// Run one pass inline and return its result. Rejected while another
    /// pass is in flight.
    pub async fn run_once(&self) -> Result<SyncStatus> {
        self.require_connected()?;
        let _guard = Arc::clone(&self.inner.pass_gate)
            .try_lock_owned()
            .map_err(|_| SyncError::PassInFlight)?;
        Ok(execute_pass(&self.inner).await)
    }

    pub async fn set_interval_secs(&self, secs: u64) -> Result<()> {
        self.inner.settings.lock().await.set_interval_secs(secs)
    }

    pub async fn set_mode(&self, mode: SyncMode) {
        self.inner.settings.lock().await.mode = mode;
    }

    pub async fn set_default_resolution(&self, resolution: DefaultResolution) {
        self.inner.settings.lock().await.default_resolution = resolution;
        self.inner
            .engine
            .lock()
            .await
            .set_default_resolution(resolution);
    }

    pub async fn settings(&self) -> SyncSettings {
        self.inner.settings.lock().await.clone()
    }

    pub async fn conflicts(&self) -> Vec<ConflictEntry> {
        self.inner.engine.lock().await.pending_conflicts().to_vec()
    }

    pub async fn has_pending_conflicts(&self) -> bool {
        self.inner.engine.lock().await.has_pending_conflicts()
    }

    pub async fn resolve_conflict(&self, path: &Path, policy: ResolutionPolicy) -> Result<()> {
        let rules = self.inner.rules.lock().await.all().to_vec();
        self.inner
            .engine
            .lock()
            .await
            .resolve_conflict(&rules, path, policy)
            .await
    }

    pub async fn resolve_all_conflicts(&self, policy: ResolutionPolicy) -> Vec<String> {
        let rules = self.inner.rules.lock().await.all().to_vec();
        self.inner
            .engine
            .lock()
            .await
            .resolve_all_conflicts(&rules, policy)
            .await
    }

    /// Run `f` against the rule store. Rule edits share the store with the
    /// pass loop, so access goes through the same lock.
    pub async fn with_rules<R>(&self, f: impl FnOnce(&mut RuleStore) -> R) -> R {
        let mut rules = self.inner.rules.lock().await;
        f(&mut rules)
    }

    pub async fn with_history<R>(&self, f: impl FnOnce(&mut HistoryLog) -> R) -> R {
        let mut history = self.inner.history.lock().await;
        f(&mut history)
    }

    pub fn reports(&self) -> &ReportStore {
        &self.inner.reports
    }

    pub async fn stats(&self) -> SyncStats {
        let settings = self.inner.settings.lock().await.clone();
        let pending = self
            .inner
            .engine
            .lock()
            .await
            .pending_conflicts()
            .iter()
            .filter(|e| e.resolution == crate::conflict::Resolution::Pending)
            .count();
        SyncStats {
            running: self.is_running(),
            connected: self.inner.connected.load(Ordering::SeqCst),
            interval_secs: settings.interval_secs,
            mode: settings.mode,
            pending_conflicts: pending,
            rule_count: self.inner.rules.lock().await.len(),
            history: self.inner.history.lock().await.stats(),
        }
    }

    fn require_connected(&self) -> Result<()> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotReady(
                "object store connection not established".to_string(),
            ));
        }
        Ok(())
    }
}

async fn scheduled_pass(shared: &Shared) {
    let _guard = shared.pass_gate.lock().await;
    execute_pass(shared).await;
}

/// One full pass: emit start, reconcile, record history, write the report,
/// emit completion. History/report failures are logged, never fatal.
async fn execute_pass(shared: &Shared) -> SyncStatus {
    let started = Instant::now();
    let mode = shared.settings.lock().await.mode;
    shared
        .events
        .emit(SyncEvent::PassStarted(SyncStatus::begin(mode)));

    let rules = shared.rules.lock().await.enabled();
    let status = shared.engine.lock().await.run_pass(&rules, mode).await;
    let duration = started.elapsed();

    match shared.history.lock().await.record(&status, duration) {
        Ok(entry) => shared.events.emit(SyncEvent::LogAppended(entry)),
        Err(e) => tracing::warn!(error = %e, "failed to record history entry"),
    }
    if let Err(e) = shared.reports.save(&status) {
        tracing::warn!(error = %e, "failed to write sync report");
    }

    shared.events.emit(SyncEvent::PassCompleted(status.clone()));
    status
}
