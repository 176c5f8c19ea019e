//! Concurrent transfer engine
//!
//! Drives a bulk transfer over a bounded worker pool. The plan's header
//! initializes the counters before any item runs; workers report through
//! atomics, a renderer polls snapshots, and a process-wide try-lock keeps
//! the engine to one managed transfer at a time. Cancellation is
//! cooperative: in-flight calls finish, nothing new starts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::{TransferItem, TransferPlan};
use crate::error::{Error, Result};

/// Minimum worker-pool size
pub const MIN_WORKERS: usize = 1;
/// Maximum worker-pool size
pub const MAX_WORKERS: usize = 16;
/// Default worker-pool size
pub const DEFAULT_WORKERS: usize = 4;

/// Result of one item: bytes moved, or the skip sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemResult {
    /// Bytes transferred for this item
    Transferred(u64),
    /// Destination already identical; bytes stay as pre-counted
    Skipped,
}

/// Per-item primitive bound to the adapters at submission time
pub type ItemOp = Arc<dyn Fn(TransferItem) -> BoxFuture<'static, Result<ItemResult>> + Send + Sync>;

/// One failed item, recorded without aborting peers
#[derive(Debug, Clone)]
pub struct ItemFailure {
    /// Error rendered to one line
    pub status: String,
    /// Item source
    pub source: String,
    /// Item destination
    pub dest: String,
}

/// Outcome of a completed (or cancelled) run
#[derive(Debug)]
pub struct TransferReport {
    /// Items processed (transferred, skipped, or failed)
    pub files_done: u64,
    /// Items skipped as already identical
    pub files_skipped: u64,
    /// Bytes actually moved
    pub bytes_done: u64,
    /// Wall-clock duration
    pub elapsed: Duration,
    /// Per-item failures
    pub failures: Vec<ItemFailure>,
    /// Whether the run was interrupted
    pub cancelled: bool,
}

/// Shared monotonic counters for one run
#[derive(Debug)]
pub struct TransferCounters {
    files_done: AtomicU64,
    files_total: AtomicU64,
    bytes_done: AtomicU64,
    bytes_total: AtomicU64,
    started: Mutex<Instant>,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    /// Items processed so far
    pub files_done: u64,
    /// Items announced by the plan header
    pub files_total: u64,
    /// Bytes moved so far
    pub bytes_done: u64,
    /// Bytes announced by the plan header
    pub bytes_total: u64,
    /// Time since the run started
    pub elapsed: Duration,
}

impl CounterSnapshot {
    /// Percent complete by bytes, clamped to 100
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            if self.files_total == 0 {
                return 100.0;
            }
            return (self.files_done as f64 / self.files_total as f64 * 100.0).min(100.0);
        }
        (self.bytes_done as f64 / self.bytes_total as f64 * 100.0).min(100.0)
    }

    /// Instantaneous rate in bytes per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }

    /// Whether every announced item has been processed
    pub fn complete(&self) -> bool {
        self.files_done >= self.files_total
    }
}

impl TransferCounters {
    fn new() -> Self {
        Self {
            files_done: AtomicU64::new(0),
            files_total: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }

    fn reset(&self, files_total: u64, bytes_total: u64) {
        self.files_done.store(0, Ordering::SeqCst);
        self.bytes_done.store(0, Ordering::SeqCst);
        self.files_total.store(files_total, Ordering::SeqCst);
        self.bytes_total.store(bytes_total, Ordering::SeqCst);
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
    }

    fn add_bytes(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::SeqCst);
    }

    fn file_done(&self) {
        self.files_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot for the renderer
    pub fn snapshot(&self) -> CounterSnapshot {
        let elapsed = self
            .started
            .lock()
            .map(|s| s.elapsed())
            .unwrap_or_default();
        CounterSnapshot {
            files_done: self.files_done.load(Ordering::SeqCst),
            files_total: self.files_total.load(Ordering::SeqCst),
            bytes_done: self.bytes_done.load(Ordering::SeqCst),
            bytes_total: self.bytes_total.load(Ordering::SeqCst),
            elapsed,
        }
    }
}

/// The engine; cheap to clone, all state shared
#[derive(Clone)]
pub struct TransferEngine {
    workers: usize,
    counters: Arc<TransferCounters>,
    lock: Arc<tokio::sync::Mutex<()>>,
    cancel: Arc<AtomicBool>,
}

impl TransferEngine {
    /// Engine with a clamped worker-pool size
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(MIN_WORKERS, MAX_WORKERS),
            counters: Arc::new(TransferCounters::new()),
            lock: Arc::new(tokio::sync::Mutex::new(())),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Worker-pool size
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Counter handle for a progress renderer
    pub fn counters(&self) -> Arc<TransferCounters> {
        Arc::clone(&self.counters)
    }

    /// Whether a managed transfer currently holds the lock
    pub fn busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Request cooperative cancellation of the running transfer.
    ///
    /// Workers finish their in-flight calls; no new item starts. `run`
    /// joins the pool, releases the lock, and reports `cancelled`.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Drive a plan to completion.
    ///
    /// Fails fast with [`Error::TransferBusy`] when another managed
    /// transfer is running; the running transfer is not perturbed.
    pub async fn run(&self, plan: TransferPlan, op: ItemOp) -> Result<TransferReport> {
        let _guard = self.lock.try_lock().map_err(|_| Error::TransferBusy)?;
        self.cancel.store(false, Ordering::SeqCst);
        self.counters.reset(plan.files, plan.bytes);

        tracing::info!(files = plan.files, bytes = plan.bytes, "transfer started");

        let sem = Arc::new(Semaphore::new(self.workers));
        let mut pool: JoinSet<(TransferItem, Result<ItemResult>)> = JoinSet::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let skipped = Arc::new(AtomicU64::new(0));
        let mut items = plan.items;
        let mut cancelled = false;

        while let Some(next) = items.next().await {
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            let item = match next {
                Ok(item) => item,
                Err(e) => {
                    // A planner fault loses the remainder of the plan but
                    // not the items already submitted.
                    if let Ok(mut f) = failures.lock() {
                        f.push(ItemFailure {
                            status: e.to_string(),
                            source: "<plan>".into(),
                            dest: String::new(),
                        });
                    }
                    break;
                }
            };

            let permit = match Arc::clone(&sem).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }

            let op = Arc::clone(&op);
            let counters = Arc::clone(&self.counters);
            let cancel = Arc::clone(&self.cancel);
            let failures = Arc::clone(&failures);
            let skipped = Arc::clone(&skipped);
            pool.spawn(async move {
                let _permit = permit;
                if cancel.load(Ordering::SeqCst) {
                    return (item, Err(Error::Cancelled));
                }
                let result = op(item.clone()).await;
                match &result {
                    Ok(ItemResult::Transferred(n)) => {
                        counters.add_bytes(*n);
                        counters.file_done();
                    }
                    Ok(ItemResult::Skipped) => {
                        skipped.fetch_add(1, Ordering::SeqCst);
                        counters.file_done();
                    }
                    Err(e) => {
                        if let Ok(mut f) = failures.lock() {
                            f.push(ItemFailure {
                                status: e.to_string(),
                                source: item.source.clone(),
                                dest: item.dest.clone(),
                            });
                        }
                        counters.file_done();
                    }
                }
                (item, result)
            });
        }
        drop(items);

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "transfer worker panicked");
            }
        }

        if self.cancel.load(Ordering::SeqCst) {
            cancelled = true;
        }

        let snap = self.counters.snapshot();
        let failures = failures.lock().map(|f| f.clone()).unwrap_or_default();
        let report = TransferReport {
            files_done: snap.files_done,
            files_skipped: skipped.load(Ordering::SeqCst),
            bytes_done: snap.bytes_done,
            elapsed: snap.elapsed,
            failures,
            cancelled,
        };
        tracing::info!(
            files = report.files_done,
            bytes = report.bytes_done,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "transfer finished"
        );
        Ok(report)
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
