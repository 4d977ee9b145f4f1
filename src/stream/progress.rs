use crate::error::StreamError;
use crate::range::{RangeError, RangeSpec};
use std::fmt;

/// Colour hint attached to a status update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusColor {
    Gray,
    Blue,
    Green,
    Red,
}

impl StatusColor {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gray => "gray",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
        }
    }
}

/// Progress after one consumed record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProgressReport {
    pub consumed: usize,
    pub total: usize,
    /// Green on the record that completes the range, blue otherwise
    pub color: StatusColor,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.consumed, self.total)
    }
}

/// Terminal report of a run that was stopped early.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StopReport {
    /// Rows that were never consumed
    pub remaining: usize,
    pub total: usize,
}

impl fmt::Display for StopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stopped: {}/{}", self.remaining, self.total)
    }
}

/// Counts consumed rows against the size of the configured range.
///
/// The total excludes the header row. Pure bookkeeping, it performs no I/O.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    remaining: usize,
}

impl ProgressTracker {
    pub fn new(range: &RangeSpec) -> Result<Self, RangeError> {
        let total = range.bounded_end_row()?.saturating_sub(range.start_row);
        Ok(Self {
            total,
            remaining: total,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Records one consumed row.
    ///
    /// When the count reaches the total the report is green and the counters start over.
    pub fn advance(&mut self) -> ProgressReport {
        self.remaining = self.remaining.saturating_sub(1);
        let consumed = self.total - self.remaining;
        let color = if consumed == self.total {
            self.remaining = self.total;
            StatusColor::Green
        } else {
            StatusColor::Blue
        };
        ProgressReport {
            consumed,
            total: self.total,
            color,
        }
    }

    /// Reports the unconsumed rows and resets for the next run.
    pub fn stop(&mut self) -> StopReport {
        let report = StopReport {
            remaining: self.remaining,
            total: self.total,
        };
        self.reset();
        report
    }

    pub fn reset(&mut self) {
        self.remaining = self.total;
    }
}

/// Receives status changes of a stream. Implemented by the host for display.
///
/// Every method defaults to doing nothing.
pub trait ProgressObserver: Send + Sync {
    /// Free-form status, e.g. the configured range on creation or "Process starting...".
    fn on_status(&self, _text: &str, _color: StatusColor) {}

    fn on_progress(&self, _report: &ProgressReport) {}

    fn on_stopped(&self, _report: &StopReport) {}

    fn on_error(&self, _error: &StreamError) {}
}

impl ProgressObserver for () {}
