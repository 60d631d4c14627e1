
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::LearningRecord;

struct CacheEntry {
    records: Arc<Vec<LearningRecord>>,
    stored_at: Instant,
}

/// Per-tenant learning records with a time-to-live
pub struct LearningCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, CacheEntry>>,
}

impl LearningCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh records for a tenant; expired entries are evicted on read
    #[inline]
    pub fn get(&self, tenant_id: i64) -> Option<Arc<Vec<LearningRecord>>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entries
            .get(&tenant_id)
            .map(|entry| entry.stored_at.elapsed() >= self.ttl)?;

        if expired {
            debug!("Learning cache for tenant {} expired", tenant_id);
            entries.remove(&tenant_id);
            return None;
        }

        entries.get(&tenant_id).map(|entry| Arc::clone(&entry.records))
    }

    #[inline]
    pub fn store(&self, tenant_id: i64, records: Vec<LearningRecord>) -> Arc<Vec<LearningRecord>> {
        let records = Arc::new(records);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            tenant_id,
            CacheEntry {
                records: Arc::clone(&records),
                stored_at: Instant::now(),
            },
        );
        records
    }

    #[inline]
    pub fn invalidate(&self, tenant_id: i64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tenant_id);
    }
}
