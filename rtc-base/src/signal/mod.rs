
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::sync::lock;

/// Handle returned by `Signal::connect`, used to disconnect the slot.
pub type SlotId = u64;

type Slot<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A typed multi-subscriber callback list.
///
/// Slots are invoked in connection order, outside the signal's lock, so a
/// slot may connect or disconnect slots (including itself) while being
/// called. Each connected slot runs at most once per `emit`.
pub struct Signal<T> {
    slots: Mutex<Vec<(SlotId, Slot<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal {
            slots: Mutex::new(vec![]),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &lock(&self.slots).len())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<F>(&self, f: F) -> SlotId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.slots).push((id, Arc::new(f)));
        id
    }

    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|(sid, _)| *sid != id);
        slots.len() != before
    }

    pub fn disconnect_all(&self) {
        lock(&self.slots).clear();
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn emit(&self, value: &T) {
        let slots: Vec<Slot<T>> = lock(&self.slots)
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect();
        for slot in slots {
            slot(value);
        }
    }
}
