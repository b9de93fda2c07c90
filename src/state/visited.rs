use crate::state::{NodeId, NodeRecord};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records of every admitted panorama, keyed by id
///
/// Each id is written at most once because the frontier hands every id to
/// exactly one worker. The store does not re-check that.
#[derive(Debug, Default)]
pub struct VisitedStore {
    records: Mutex<HashMap<NodeId, NodeRecord>>,
}

impl VisitedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: HashMap<NodeId, NodeRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, NodeRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, id: NodeId, record: NodeRecord) {
        self.lock().insert(id, record);
    }

    pub fn has(&self, id: &NodeId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Copies all records
    pub fn snapshot(&self) -> HashMap<NodeId, NodeRecord> {
        self.lock().clone()
    }

    /// Replaces all records
    pub fn restore(&self, records: HashMap<NodeId, NodeRecord>) {
        *self.lock() = records;
    }
}
