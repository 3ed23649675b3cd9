//! Sync scheduler: periodic auto-pull with a start/stop lifecycle.
//!
//! The periodic loop is a single tokio task owned by the scheduler. It only
//! issues the next pull after its interval wait, so it never overlaps itself;
//! overlap with manual pulls is prevented by the repository lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::repository::Repository;

/// Upper bound on how long `stop()` waits for an in-flight pull to finish
/// before aborting the loop task.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_running: bool,
    pub last_pull_time: Option<DateTime<Utc>>,
    /// Seconds.
    pub auto_pull_interval: u64,
    pub auto_pull_on_startup: bool,
}

struct SyncShared {
    repo: Arc<Repository>,
    interval: Duration,
    pull_on_startup: bool,
    running: AtomicBool,
    last_pull: RwLock<Option<DateTime<Utc>>>,
}

impl SyncShared {
    async fn perform_pull(&self) -> bool {
        info!("performing automatic pull");

        let pulled = if !self.repo.is_available().await {
            warn!("git repository not available for auto-sync");
            false
        } else {
            let result = self.repo.pull().await;
            if result.success {
                info!(message = %result.message, "auto-pull succeeded");
            } else {
                warn!(
                    message = %result.message,
                    details = result.details.as_deref().unwrap_or(""),
                    "auto-pull failed"
                );
            }
            result.success
        };

        self.record_attempt();
        pulled
    }

    fn record_attempt(&self) {
        let now = Utc::now();
        match self.last_pull.write() {
            Ok(mut last) => *last = Some(now),
            Err(poisoned) => *poisoned.into_inner() = Some(now),
        }
    }

    fn last_pull(&self) -> Option<DateTime<Utc>> {
        match self.last_pull.read() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            // A stop requested while sleeping must suppress the pull.
            if cancel.is_cancelled() || !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.perform_pull().await;
        }
        info!("sync loop stopped");
    }
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct SyncScheduler {
    shared: Arc<SyncShared>,
    /// Serializes start/stop and owns the loop task.
    task: Mutex<Option<LoopHandle>>,
    stop_timeout: Duration,
}

impl SyncScheduler {
    pub fn new(repo: Arc<Repository>, interval: Duration, pull_on_startup: bool) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                repo,
                interval,
                pull_on_startup,
                running: AtomicBool::new(false),
                last_pull: RwLock::new(None),
            }),
            task: Mutex::new(None),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if self.is_running() {
            warn!("auto-sync is already running");
            return;
        }

        self.shared.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.shared.interval.as_secs_f64(),
            "starting auto-sync"
        );

        if self.shared.pull_on_startup {
            self.shared.perform_pull().await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.shared).run_loop(cancel.clone()));
        *task = Some(LoopHandle {
            cancel,
            task: handle,
        });
    }

    /// Cancel the loop and wait for it to exit. Once this returns no
    /// scheduled pull can start.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if !self.is_running() {
            return;
        }

        self.shared.running.store(false, Ordering::SeqCst);
        info!("stopping auto-sync");

        let Some(LoopHandle { cancel, task: mut handle }) = task.take() else {
            return;
        };
        cancel.cancel();

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "sync loop task failed"),
            Err(_) => {
                warn!(
                    timeout_secs = self.stop_timeout.as_secs_f64(),
                    "sync loop did not stop in time; aborting"
                );
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    /// Pull now, independent of the periodic loop. Returns whether the pull
    /// succeeded; the attempt time is recorded either way.
    pub async fn perform_pull(&self) -> bool {
        self.shared.perform_pull().await
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_running: self.is_running(),
            last_pull_time: self.shared.last_pull(),
            auto_pull_interval: self.shared.interval.as_secs(),
            auto_pull_on_startup: self.shared.pull_on_startup,
        }
    }
}
