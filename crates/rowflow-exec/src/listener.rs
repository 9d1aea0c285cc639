//! Per-row callbacks attached to one unit.
//!
//! Listeners run synchronously on the unit's thread; keep them cheap.

use rowflow_core::prelude::{Record, UnitKey};

pub trait RowListener: Send + Sync {
    /// A record was pulled from input `input`.
    fn row_read(&self, _unit: &UnitKey, _input: usize, _record: &Record) {}

    /// A record left the unit on its main outputs.
    fn row_written(&self, _unit: &UnitKey, _record: &Record) {}

    /// An error row was routed to the unit's error target.
    fn error_row_written(&self, _unit: &UnitKey, _record: &Record) {}
}
