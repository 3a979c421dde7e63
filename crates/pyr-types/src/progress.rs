//! Progress reporting and cancellation.
//!
//! Long-running operations (export, synchronization) call a [`ProgressSink`]
//! at fixed checkpoints. The sink may answer with [`Cancelled`], in which case
//! the operation stops as soon as possible. Work already sent elsewhere is not
//! reverted.

use thiserror::Error;

/// Signal raised by a progress sink to stop the running operation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Receiver of progress checkpoints.
pub trait ProgressSink: Send {
    /// Report progress. `value` / `end_value` describe position within the
    /// current phase when known.
    fn report(
        &mut self,
        message: &str,
        value: Option<u64>,
        end_value: Option<u64>,
    ) -> Result<(), Cancelled>;
}

/// Sink that ignores every report and never cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _: &str, _: Option<u64>, _: Option<u64>) -> Result<(), Cancelled> {
        Ok(())
    }
}

/// One recorded checkpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressReport {
    pub message: String,
    pub value: Option<u64>,
    pub end_value: Option<u64>,
}

/// Sink that records every report, optionally cancelling after a number of
/// them. Intended for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    pub reports: Vec<ProgressReport>,
    cancel_after: Option<usize>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel on the `n`-th report (1-based). That report is still recorded.
    pub fn cancelling_after(n: usize) -> Self {
        Self {
            reports: Vec::new(),
            cancel_after: Some(n),
        }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.message.as_str()).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(
        &mut self,
        message: &str,
        value: Option<u64>,
        end_value: Option<u64>,
    ) -> Result<(), Cancelled> {
        self.reports.push(ProgressReport {
            message: message.to_string(),
            value,
            end_value,
        });
        match self.cancel_after {
            Some(n) if self.reports.len() >= n => Err(Cancelled),
            _ => Ok(()),
        }
    }
}
