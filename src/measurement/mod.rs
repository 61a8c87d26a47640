//! # Measurement Log
//!
//! Append-only record of every accepted value update. The on-disk format is
//! one `;`-separated record per line under a fixed header:
//!
//! ```text
//! ts;entityId;value;valid
//! 2026-10-18T09:30:00.125Z;12;3.400;True
//! ```
//!
//! Readers skip malformed lines instead of aborting.

pub mod file;
pub mod memory;

pub use file::FileMeasurementLog;
pub use memory::MemoryMeasurementLog;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::EntityId;
use crate::error::CoreResult;

/// Header line written at the top of every log file
pub const LOG_HEADER: &str = "ts;entityId;value;valid";

/// Number of recent points shown by history views
pub const HISTORY_POINTS: usize = 4;

/// One accepted value update. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub entity_id: EntityId,
    pub value: f64,
    pub is_valid: bool,
}

impl MeasurementRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{};{};{:.3};{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.entity_id,
            self.value,
            if self.is_valid { "True" } else { "False" }
        )
    }

    /// Parses one log line. Returns `None` for the header and for anything
    /// malformed (wrong field count, bad timestamp, id or value). An
    /// unrecognised validity literal reads as invalid.
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(';').collect();
        let [ts, id, value, valid] = fields.as_slice() else {
            return None;
        };
        let timestamp = DateTime::parse_from_rfc3339(ts.trim()).ok()?.with_timezone(&Utc);
        let entity_id = id.trim().parse().ok()?;
        let value = value.trim().parse().ok()?;
        let is_valid = valid.trim().eq_ignore_ascii_case("true");
        Some(Self {
            timestamp,
            entity_id,
            value,
            is_valid,
        })
    }
}

/// Durable, append-only measurement storage.
///
/// `append` must surface every persistence failure; nothing is swallowed.
#[cfg_attr(test, mockall::automock)]
pub trait MeasurementLog: Send + Sync {
    fn append(&self, record: &MeasurementRecord) -> CoreResult<()>;

    /// Up to `limit` records for `entity_id`, oldest first, most recent last
    fn query(&self, entity_id: EntityId, limit: usize) -> CoreResult<Vec<MeasurementRecord>>;

    /// Drops every record, leaving only the header
    fn clear(&self) -> CoreResult<()>;
}

/// Keeps the last `limit` items of an oldest-first sequence.
pub(crate) fn take_last(
    records: impl Iterator<Item = MeasurementRecord>,
    limit: usize,
) -> Vec<MeasurementRecord> {
    let mut all: Vec<_> = records.collect();
    let skip = all.len().saturating_sub(limit);
    all.drain(..skip);
    all
}
