use crate::error::{Result, ScopeError};
use crate::types::Detection;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Immutable detection list as published by one worker.
pub type SlotValue = Arc<[Detection]>;

/// Current detections of one region. Written by exactly one worker.
struct ResultSlot {
    detections: RwLock<SlotValue>, // replaced wholesale, never mutated in place
    version: AtomicU64,
}

impl ResultSlot {
    fn new() -> Self {
        Self {
            detections: RwLock::new(Arc::from(Vec::new())),
            version: AtomicU64::new(0),
        }
    }
}

/// ResultTable is the only state shared between detection workers and the renderer.
///
/// Rules:
/// - One slot per region id, fixed at construction.
/// - A write replaces the whole list; readers see the old list or the new one.
/// - Slots are independent, so there is no cross-slot locking.
/// - After `seal()` returns, every write fails with `SlotSealed`.
pub struct ResultTable {
    slots: Vec<ResultSlot>,
    sealed: AtomicBool,
}

impl ResultTable {
    pub fn new(region_count: usize) -> Self {
        Self {
            slots: (0..region_count).map(|_| ResultSlot::new()).collect(),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, region_id: u32) -> Result<&ResultSlot> {
        self.slots
            .get(region_id as usize)
            .ok_or(ScopeError::UnknownRegion(region_id))
    }

    /// Replace the detections of `region_id`. An empty list clears the slot.
    pub fn write(&self, region_id: u32, detections: Vec<Detection>) -> Result<u64> {
        let slot = self.slot(region_id)?;
        let value: SlotValue = Arc::from(detections);

        let mut guard = slot.detections.write();
        // checked under the slot lock so seal() can fence in-flight writes
        if self.is_sealed() {
            return Err(ScopeError::SlotSealed(region_id));
        }
        *guard = value;
        Ok(slot.version.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn read(&self, region_id: u32) -> Result<SlotValue> {
        Ok(self.slot(region_id)?.detections.read().clone())
    }

    /// Snapshot of every slot for one render pass.
    pub fn read_all(&self) -> Vec<(u32, SlotValue)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(id, slot)| (id as u32, slot.detections.read().clone()))
            .collect()
    }

    /// Number of successful writes to `region_id`.
    pub fn version(&self, region_id: u32) -> Result<u64> {
        Ok(self.slot(region_id)?.version.load(Ordering::SeqCst))
    }

    pub fn total_detections(&self) -> usize {
        self.slots.iter().map(|slot| slot.detections.read().len()).sum()
    }

    /// Reject all further writes. Returns once no write is in flight.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        for slot in &self.slots {
            drop(slot.detections.write());
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, RawDetection, Region};
    use std::collections::HashSet;
    use std::thread;

    fn detections(region: &Region, count: usize) -> Vec<Detection> {
        (0..count)
            .map(|i| {
                let raw = RawDetection::new(BoundingBox::new(i as i32, 0, i as i32 + 1, 1), 0.9, "obj");
                Detection::from_raw(raw, region)
            })
            .collect()
    }

    #[test]
    fn write_replaces_whole_list() {
        let region = Region::new(1, 400, 0, 400, 300);
        let table = ResultTable::new(4);

        table.write(1, detections(&region, 3)).unwrap();
        assert_eq!(table.read(1).unwrap().len(), 3);

        table.write(1, Vec::new()).unwrap();
        assert!(table.read(1).unwrap().is_empty());
        assert_eq!(table.version(1).unwrap(), 2);
        assert_eq!(table.version(0).unwrap(), 0);
    }

    #[test]
    fn read_all_returns_every_slot_in_order() {
        let table = ResultTable::new(4);
        table.write(2, detections(&Region::new(2, 0, 300, 400, 300), 2)).unwrap();

        let snapshot = table.read_all();
        let ids: Vec<u32> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(snapshot[2].1.len(), 2);
        assert_eq!(table.total_detections(), 2);
    }

    #[test]
    fn unknown_region_is_rejected() {
        let table = ResultTable::new(2);
        assert!(matches!(table.write(5, Vec::new()), Err(ScopeError::UnknownRegion(5))));
        assert!(table.read(2).is_err());
    }

    #[test]
    fn sealed_table_rejects_writes_and_freezes_versions() {
        let table = ResultTable::new(1);
        table.write(0, Vec::new()).unwrap();
        table.seal();

        assert!(table.is_sealed());
        assert!(matches!(table.write(0, Vec::new()), Err(ScopeError::SlotSealed(0))));
        assert_eq!(table.version(0).unwrap(), 1);
    }

    #[test]
    fn concurrent_readers_never_see_partial_lists() {
        let table = Arc::new(ResultTable::new(1));
        let region = Region::new(0, 0, 0, 100, 100);
        let lengths = [0usize, 1, 5, 17, 64];

        let writer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for round in 0..2_000 {
                    let len = lengths[round % lengths.len()];
                    table.write(0, detections(&region, len)).unwrap();
                }
            })
        };

        let reader = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let allowed: HashSet<usize> = lengths.iter().copied().collect();
                for _ in 0..20_000 {
                    let snapshot = table.read(0).unwrap();
                    assert!(allowed.contains(&snapshot.len()));
                    // every entry in one list comes from the same write
                    for (i, d) in snapshot.iter().enumerate() {
                        assert_eq!(d.bbox.x1, i as i32);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(table.version(0).unwrap(), 2_000);
    }
}
