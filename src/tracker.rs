//! Pairs a long-running operation with a progress poller.
//!
//! The operation runs on its own tokio task and hands its result back over a
//! oneshot channel. The calling task polls a progress probe at a fixed cadence
//! until the probe reports 100%, the operation finishes, the probe fails, or
//! the cancellation token fires. Whatever stopped the poller, the returned
//! result is always the operation's own, read only after its task was joined.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

pub type OperationResult<T> = Result<T>;

/// A completion percentage, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Progress(u8);

impl Progress {
    pub const COMPLETE: Progress = Progress(100);

    pub fn new(percent: u32) -> Self {
        Progress(percent.min(100) as u8)
    }

    /// Truncates fractional percentages; negative values clamp to 0.
    pub fn from_f64(percent: f64) -> Option<Self> {
        if !percent.is_finite() {
            return None;
        }
        Some(Self::new(percent.max(0.0).trunc().min(100.0) as u32))
    }

    pub fn is_complete(self) -> bool {
        self >= Self::COMPLETE
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Accepts `"42%"`, `"42"` and `"42.7"`.
impl FromStr for Progress {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
        number
            .parse::<f64>()
            .ok()
            .and_then(Progress::from_f64)
            .ok_or_else(|| format!("Invalid progress value: '{}'", s))
    }
}

/// Why the polling loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStop {
    Complete,
    OperationFinished,
    ProbeFailed(String),
    Cancelled,
}

/// Outcome of a tracked operation. `result` is produced exactly once per
/// `track()` call; the remaining fields describe what the poller saw.
#[derive(Debug)]
pub struct Tracked<T> {
    pub result: OperationResult<T>,
    pub stop: PollStop,
    pub polls: u32,
    pub last_progress: Progress,
}

pub struct OperationTracker {
    label: String,
    interval: Duration,
    cancel: CancellationToken,
}

impl OperationTracker {
    pub fn new(label: impl Into<String>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            label: label.into(),
            interval,
            cancel,
        }
    }

    /// Spawns `operation` and polls `probe` until one of the exit conditions
    /// is met, then joins the operation and returns its result.
    ///
    /// The probe yields `Ok(None)` when it has no reading yet. The operation
    /// is expected to observe the same cancellation token itself; the tracker
    /// only stops polling when it fires.
    pub async fn track<T, Op, P, PFut>(&self, operation: Op, mut probe: P) -> Tracked<T>
    where
        T: Send + 'static,
        Op: Future<Output = OperationResult<T>> + Send + 'static,
        P: FnMut() -> PFut,
        PFut: Future<Output = Result<Option<Progress>>>,
    {
        let (tx, rx) = oneshot::channel();
        let finished = CancellationToken::new();
        let finished_guard = finished.clone().drop_guard();

        let handle = tokio::spawn(async move {
            // Fires on return and on panic alike.
            let _finished = finished_guard;
            let _ = tx.send(operation.await);
        });

        let mut polls: u32 = 0;
        let mut shown: Option<Progress> = None;

        let stop = loop {
            // Cancellation wins over a finished operation.
            if self.cancel.is_cancelled() {
                break PollStop::Cancelled;
            }
            if finished.is_cancelled() {
                debug!("{} task is no longer running, leaving progress monitor", self.label);
                break PollStop::OperationFinished;
            }

            polls += 1;
            let reading = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PollStop::Cancelled,
                reading = probe() => reading,
            };

            match reading {
                Ok(Some(progress)) => {
                    let high = shown.map_or(progress, |prev| prev.max(progress));
                    if shown.is_some_and(|prev| progress < prev) {
                        debug!("{} progress went back from {:?} to {}", self.label, shown, progress);
                    }
                    if shown != Some(high) {
                        println!("{} progress: {}", self.label, high);
                        shown = Some(high);
                    }
                    if high.is_complete() {
                        break PollStop::Complete;
                    }
                }
                Ok(None) => debug!("No {} progress reported yet", self.label),
                Err(e) => {
                    warn!("{} progress polling failed: {}", self.label, e);
                    break PollStop::ProbeFailed(e.to_string());
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PollStop::Cancelled,
                _ = finished.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        let result = match handle.await {
            Ok(()) => rx.await.unwrap_or_else(|_| {
                Err(AppError::Internal(format!(
                    "{} task finished without reporting a result",
                    self.label
                )))
            }),
            Err(join_err) => Err(AppError::Internal(format!(
                "{} task failed: {}",
                self.label, join_err
            ))),
        };

        Tracked {
            result,
            stop,
            polls,
            last_progress: shown.unwrap_or_default(),
        }
    }
}
