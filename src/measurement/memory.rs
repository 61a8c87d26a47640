use parking_lot::Mutex;

use super::{take_last, MeasurementLog, MeasurementRecord};
use crate::domain::EntityId;
use crate::error::CoreResult;

/// In-process measurement log, for embedding without a file and for tests.
#[derive(Debug, Default)]
pub struct MemoryMeasurementLog {
    records: Mutex<Vec<MeasurementRecord>>,
}

impl MemoryMeasurementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record in append order
    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MeasurementLog for MemoryMeasurementLog {
    fn append(&self, record: &MeasurementRecord) -> CoreResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn query(&self, entity_id: EntityId, limit: usize) -> CoreResult<Vec<MeasurementRecord>> {
        let records = self.records.lock();
        Ok(take_last(
            records.iter().filter(|r| r.entity_id == entity_id).cloned(),
            limit,
        ))
    }

    fn clear(&self) -> CoreResult<()> {
        self.records.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_query_filters_and_limits() {
        let log = MemoryMeasurementLog::new();
        for (id, value) in [(1, 1.5), (2, 2.5), (1, 3.5), (1, 4.5)] {
            log.append(&MeasurementRecord {
                timestamp: Utc::now(),
                entity_id: id,
                value,
                is_valid: true,
            })
            .unwrap();
        }
        let values: Vec<_> = log.query(1, 2).unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![3.5, 4.5]);
        assert_eq!(log.len(), 4);
        log.clear().unwrap();
        assert!(log.is_empty());
    }
}
