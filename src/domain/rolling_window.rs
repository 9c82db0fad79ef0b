// Rolling window - bounded FIFO history of ingested records
use super::sensor::SensorRecord;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;

pub const DEFAULT_MAX_DATA_POINTS: usize = 100;

/// Immutable view of the window at one point in time. Cheap to clone and
/// safe to hand to readers on other tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot(Arc<[SensorRecord]>);

impl Deref for WindowSnapshot {
    type Target = [SensorRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<SensorRecord>> for WindowSnapshot {
    fn from(records: Vec<SensorRecord>) -> Self {
        Self(records.into())
    }
}

impl Serialize for WindowSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    records: VecDeque<SensorRecord>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Rebuild a window from a published snapshot, keeping only the newest
    /// `capacity` records.
    pub fn from_snapshot(capacity: usize, snapshot: &WindowSnapshot) -> Self {
        let mut window = Self::new(capacity);
        let skip = snapshot.len().saturating_sub(window.capacity);
        window.records.extend(snapshot.iter().skip(skip).copied());
        window
    }

    /// Append `record`, evicting from the front until the capacity holds, and
    /// return the resulting snapshot.
    pub fn append(&mut self, record: SensorRecord) -> WindowSnapshot {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot::from(self.records.iter().copied().collect::<Vec<_>>())
    }

    pub fn last(&self) -> Option<&SensorRecord> {
        self.records.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sensor::Reading;

    fn record(i: i64) -> SensorRecord {
        SensorRecord::new(i, Reading::Scalar { value: i as f64 })
    }

    #[test]
    fn test_fifo_eviction() {
        let mut window = RollingWindow::new(5);
        for i in 0..12 {
            let snapshot = window.append(record(i));
            assert!(snapshot.len() <= 5);
        }

        let timestamps: Vec<i64> = window.snapshot().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![7, 8, 9, 10, 11]);
        assert_eq!(window.last().map(|r| r.timestamp), Some(11));
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let mut window = RollingWindow::new(2);
        let first = window.append(record(1));
        window.append(record(2));
        window.append(record(3));

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].timestamp, 1);
    }

    #[test]
    fn test_from_snapshot_trims_to_capacity() {
        let snapshot = WindowSnapshot::from((0..10).map(record).collect::<Vec<_>>());
        let window = RollingWindow::from_snapshot(3, &snapshot);
        let timestamps: Vec<i64> = window.snapshot().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![7, 8, 9]);
        assert_eq!(RollingWindow::new(0).capacity(), 1);
    }
}
