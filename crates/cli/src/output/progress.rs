//! Transfer progress rendering
//!
//! A single renderer task polls the engine's counters on a one-second tick
//! and drives an in-place progress line: percent complete (clamped at 100),
//! bytes moved, and the instantaneous rate `bytes_done / elapsed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ps_core::{TransferCounters, TransferReport};

/// Poll interval for the renderer
const TICK: Duration = Duration::from_secs(1);

/// In-place progress renderer over a running transfer
pub struct TransferRenderer {
    bar: Option<indicatif::ProgressBar>,
    stop: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TransferRenderer {
    /// Start polling; renders nothing when `enabled` is false
    pub fn start(counters: Arc<TransferCounters>, enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: None,
                stop: Arc::new(AtomicBool::new(false)),
                handle: None,
            };
        }

        let bar = indicatif::ProgressBar::new(1);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("[{bar:30.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let poll_bar = bar.clone();
        let handle = tokio::spawn(async move {
            loop {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let snap = counters.snapshot();
                poll_bar.set_length(snap.bytes_total.max(1));
                poll_bar.set_position(snap.bytes_done.min(snap.bytes_total.max(1)));
                poll_bar.set_message(format!(
                    "{}/s ({}/{} files)",
                    humansize::format_size(snap.rate() as u64, humansize::BINARY),
                    snap.files_done,
                    snap.files_total,
                ));
                if snap.complete() {
                    break;
                }
                tokio::time::sleep(TICK).await;
            }
        });

        Self {
            bar: Some(bar),
            stop,
            handle: Some(handle),
        }
    }

    /// Stop polling, clear the bar, and return the summary line
    pub async fn finish(mut self, report: &TransferReport) -> String {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        summary_line(report)
    }
}

/// One-line summary printed after a transfer run
pub fn summary_line(report: &TransferReport) -> String {
    let secs = report.elapsed.as_secs_f64().max(0.001);
    let rate = report.bytes_done as f64 / secs;
    let mut line = format!(
        "{} file(s), {} in {:.1}s ({}/s)",
        report.files_done,
        humansize::format_size(report.bytes_done, humansize::BINARY),
        secs,
        humansize::format_size(rate as u64, humansize::BINARY),
    );
    if report.files_skipped > 0 {
        line.push_str(&format!(", {} skipped", report.files_skipped));
    }
    if !report.failures.is_empty() {
        line.push_str(&format!(", {} FAILED", report.failures.len()));
    }
    if report.cancelled {
        line.push_str(" [cancelled]");
    }
    line
}
