//! Bounded FIFO of recent detections with file-deleting eviction.

use std::{collections::VecDeque, fs, path::PathBuf, sync::Mutex};

use tracing::warn;

use crate::relay::data::DetectionRecord;

/// Recently stored detections, oldest first. Owned by the server state and
/// shared by handle; every read and write goes through the one lock.
pub(crate) struct DetectionQueue {
    records: Mutex<VecDeque<DetectionRecord>>,
    capacity: usize,
    storage_dir: PathBuf,
}

impl DetectionQueue {
    pub(crate) fn new(capacity: usize, storage_dir: PathBuf) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
            storage_dir,
        }
    }

    /// Append a record. Past capacity the single oldest record is evicted and
    /// its backing file removed; a failed removal is logged, nothing more.
    pub(crate) fn push(&self, record: DetectionRecord) {
        let evicted = {
            let Ok(mut records) = self.records.lock() else {
                warn!("detection queue lock poisoned; dropping record");
                return;
            };
            records.push_back(record);
            if records.len() > self.capacity {
                records.pop_front()
            } else {
                None
            }
        };

        if let Some(oldest) = evicted {
            let path = self.storage_dir.join(&oldest.image);
            if let Err(err) = fs::remove_file(&path) {
                warn!("failed to remove evicted image {}: {err}", path.display());
            }
        }
    }

    /// Snapshot of up to the `limit` most recent records, oldest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<DetectionRecord> {
        match self.records.lock() {
            Ok(records) => {
                let skip = records.len().saturating_sub(limit);
                records.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }
}
