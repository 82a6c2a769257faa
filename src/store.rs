//! Latest-result store.
//!
//! Batches are immutable and shared as `Arc<DetectionBatch>`. Publishing swaps
//! the handle under a mutex, so a reader either sees the previous batch or the
//! new one, never a partial write.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::detect::DetectionBatch;

struct Slot {
    batch: Arc<DetectionBatch>,
    publications: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    published: Condvar,
}

/// Holds the most recent `DetectionBatch` for read-side consumers.
#[derive(Clone)]
pub struct ResultStore {
    shared: Arc<Shared>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    batch: Arc::new(DetectionBatch::empty()),
                    publications: 0,
                }),
                published: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.shared.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the stored batch.
    ///
    /// Returns `false` (and keeps the current batch) when `batch` belongs to an
    /// older frame than the one already stored.
    pub fn publish(&self, batch: DetectionBatch) -> bool {
        self.publish_shared(Arc::new(batch))
    }

    /// `publish` for a batch that is already shared with another consumer.
    pub fn publish_shared(&self, batch: Arc<DetectionBatch>) -> bool {
        let mut slot = self.lock();
        if batch.sequence() < slot.batch.sequence() {
            log::warn!(
                "dropping out-of-order batch: sequence {} after {}",
                batch.sequence(),
                slot.batch.sequence()
            );
            return false;
        }
        slot.batch = batch;
        slot.publications += 1;
        drop(slot);
        self.shared.published.notify_all();
        true
    }

    /// Latest published batch, or an empty batch if nothing was published yet.
    pub fn current(&self) -> Arc<DetectionBatch> {
        Arc::clone(&self.lock().batch)
    }

    /// Number of accepted publications.
    pub fn publications(&self) -> u64 {
        self.lock().publications
    }

    /// Block until a batch with `sequence >= min_sequence` is stored, or `timeout` passes.
    pub fn wait_for(&self, min_sequence: u64, timeout: Duration) -> Option<Arc<DetectionBatch>> {
        self.wait_until(timeout, |slot| slot.batch.sequence() >= min_sequence && slot.publications > 0)
    }

    /// Block until at least `count` batches have been published in total.
    pub fn wait_for_publications(&self, count: u64, timeout: Duration) -> Option<Arc<DetectionBatch>> {
        self.wait_until(timeout, |slot| slot.publications >= count)
    }

    fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&Slot) -> bool,
    ) -> Option<Arc<DetectionBatch>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if done(&slot) {
                return Some(Arc::clone(&slot.batch));
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            slot = match self.shared.published.wait_timeout(slot, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn batch(sequence: u64, labels: &[&str]) -> DetectionBatch {
        let detections = labels
            .iter()
            .map(|label| Detection::new(*label, 0.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0)))
            .collect();
        DetectionBatch::new(detections, 640, 480, sequence)
    }

    #[test]
    fn starts_empty() {
        let store = ResultStore::new();
        assert!(store.current().is_empty());
        assert_eq!(store.publications(), 0);
    }

    #[test]
    fn publish_replaces_and_keeps_old_handles_intact() {
        let store = ResultStore::new();
        store.publish(batch(1, &["cat"]));
        let held = store.current();
        store.publish(batch(2, &["dog", "person"]));

        assert_eq!(held.detections()[0].label(), "cat");
        assert_eq!(store.current().len(), 2);
        assert_eq!(store.current().sequence(), 2);
    }

    #[test]
    fn older_sequence_is_rejected() {
        let store = ResultStore::new();
        assert!(store.publish(batch(5, &["cat"])));
        assert!(!store.publish(batch(4, &["dog"])));
        assert!(store.publish(batch(5, &[])));
        assert_eq!(store.current().sequence(), 5);
        assert_eq!(store.publications(), 2);
    }

    #[test]
    fn wait_for_wakes_on_publish() {
        let store = ResultStore::new();
        let writer = store.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.publish(batch(3, &["person"]));
        });
        let seen = store.wait_for(3, Duration::from_secs(5)).expect("published");
        assert_eq!(seen.sequence(), 3);
        handle.join().unwrap();

        assert!(store.wait_for(9, Duration::from_millis(10)).is_none());
    }

    #[test]
    fn concurrent_readers_never_see_partial_batches() {
        let store = ResultStore::new();
        let reader = store.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..2_000 {
                let current = reader.current();
                // Every published batch carries exactly `sequence` detections.
                assert_eq!(current.len() as u64, current.sequence());
            }
        });
        for seq in 1..=50u64 {
            let labels: Vec<&str> = (0..seq).map(|_| "person").collect();
            store.publish(batch(seq, &labels));
        }
        handle.join().unwrap();
    }
}
