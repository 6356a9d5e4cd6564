//! Report rendering.
//!
//! Pure formatting boundary: converts aggregator snapshots and the final
//! session result into table rows and hands each row to a caller-supplied
//! sink. Printing (and redirection) belongs to the process layer.

use crate::stats::{IntervalSnapshot, SessionResult};
use crate::units::DisplayUnit;
use std::sync::Arc;

/// Receiver for formatted report rows.
///
/// Automatically implemented for any `Fn(&str)`, so the process layer
/// can pass a closure that prints to stdout.
pub trait RowSink: Send + Sync {
    fn row(&self, line: &str);
}

impl<F> RowSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn row(&self, line: &str) {
        self(line)
    }
}

/// Renders interval and final rows in the session's display unit.
#[derive(Clone)]
pub struct ReportEmitter {
    unit: DisplayUnit,
    sink: Arc<dyn RowSink>,
}

impl ReportEmitter {
    pub fn new(unit: DisplayUnit, sink: Arc<dyn RowSink>) -> Self {
        Self { unit, sink }
    }

    /// Emits the table header.
    pub fn header(&self) {
        self.sink.row(&format_header());
    }

    /// Emits one interval row.
    pub fn interval(&self, snapshot: &IntervalSnapshot) {
        self.sink.row(&format_interval_row(snapshot, self.unit));
    }

    /// Emits the separator and final total row.
    pub fn result(&self, result: &SessionResult) {
        self.sink.row(&"-".repeat(58));
        self.sink.row(&format_total_row(result, self.unit));
    }
}

pub fn format_header() -> String {
    format!(
        "{:<21} {:>15} {:>19}",
        "Interval", "Transfer", "Bandwidth"
    )
}

/// Formats one interval row: window, transfer, throughput in unit/sec.
pub fn format_interval_row(snapshot: &IntervalSnapshot, unit: DisplayUnit) -> String {
    let seconds = (snapshot.end - snapshot.start).as_secs_f64();
    let amount = unit.convert(snapshot.bytes);
    let rate = if seconds > 0.0 { amount / seconds } else { 0.0 };

    format!(
        "{:>7.1}-{:<7.1} sec {:>12.2} {:<2} {:>12.2} {}/sec",
        snapshot.start.as_secs_f64(),
        snapshot.end.as_secs_f64(),
        amount,
        unit.label(),
        rate,
        unit.label()
    )
}

/// Formats the final row covering the whole session.
pub fn format_total_row(result: &SessionResult, unit: DisplayUnit) -> String {
    let seconds = result.elapsed.as_secs_f64();
    let amount = unit.convert(result.total_bytes);
    let rate = if seconds > 0.0 { amount / seconds } else { 0.0 };
    let marker = if result.is_partial() { " (partial)" } else { "" };

    format!(
        "total {:>1.1}-{:<7.1} sec {:>12.2} {:<2} {:>12.2} {}/sec{}",
        0.0,
        seconds,
        amount,
        unit.label(),
        rate,
        unit.label(),
        marker
    )
}
