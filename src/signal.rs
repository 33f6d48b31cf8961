//! Minimal observer fan-out.
//!
//! Events in this crate carry either no payload ("something changed",
//! re-pull the state you care about) or a single reference to the thing
//! that changed. Subscribers hold no ownership; a slot stays connected
//! for the lifetime of the signal.

use std::fmt;
use std::sync::Mutex;

type Slot<T> = Box<dyn Fn(&T) + Send + Sync>;

/// An explicit observer list.
///
/// `connect` registers a slot, `emit` calls every slot in registration
/// order. Slots cannot be disconnected; the objects that own signals in
/// this crate (catalog, factory, view) live as long as their observers.
pub struct Signal<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer.
    pub fn connect(&self, slot: impl Fn(&T) + Send + Sync + 'static) {
        self.slots
            .lock()
            .expect("signal slot list poisoned")
            .push(Box::new(slot));
    }

    /// Call every observer with `payload`, in registration order.
    ///
    /// Slots run on the emitting task; anything long-running belongs in
    /// a spawned task inside the slot.
    pub fn emit(&self, payload: &T) {
        let slots = self.slots.lock().expect("signal slot list poisoned");
        for slot in slots.iter() {
            slot(payload);
        }
    }

    /// Number of connected observers.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("signal slot list poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_reaches_every_slot() {
        let signal = Signal::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            signal.connect(move |n| {
                count.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        signal.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn emit_without_slots_is_a_no_op() {
        let signal = Signal::<()>::new();
        assert!(signal.is_empty());
        signal.emit(&());
    }

    #[test]
    fn slots_run_in_registration_order() {
        let signal = Signal::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            signal.connect(move |_| order.lock().unwrap().push(i));
        }

        signal.emit(&());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
