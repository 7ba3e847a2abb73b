//! # Presentation Handoff
//!
//! Single writer, many readers. The tick loop publishes fully committed
//! state once per tick; render or logging threads read the newest committed
//! value while the next tick is being simulated.
//!
//! Readers get an `Arc` and never hold the lock while using the value, so
//! a slow reader cannot stall the writer.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::tick::Tick;

/// A value committed at the end of a tick.
#[derive(Debug)]
pub struct Committed<T> {
    /// Tick the value belongs to.
    pub tick: Tick,
    /// The committed value.
    pub value: T,
}

/// Latest committed value, shared between the tick loop and readers.
#[derive(Debug)]
pub struct CommittedView<T> {
    latest: RwLock<Option<Arc<Committed<T>>>>,
}

impl<T> CommittedView<T> {
    /// Empty view.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: parking_lot::const_rwlock(None),
        }
    }

    /// Publishes `value` as the state after `tick`.
    pub fn publish(&self, tick: Tick, value: T) {
        let committed = Arc::new(Committed { tick, value });
        *self.latest.write() = Some(committed);
    }

    /// Newest committed value.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Committed<T>>> {
        self.latest.read().clone()
    }

    /// Tick of the newest committed value.
    #[must_use]
    pub fn latest_tick(&self) -> Option<Tick> {
        self.latest.read().as_ref().map(|committed| committed.tick)
    }
}

impl<T> Default for CommittedView<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_publish_and_read() {
        let view = CommittedView::new();
        assert!(view.latest().is_none());

        view.publish(Tick(1), vec![1, 2, 3]);
        let first = view.latest().unwrap();
        view.publish(Tick(2), vec![4]);

        // A held snapshot is unaffected by later publishes.
        assert_eq!(first.value, vec![1, 2, 3]);
        assert_eq!(view.latest_tick(), Some(Tick(2)));
    }

    #[test]
    fn test_readers_see_monotonic_ticks() {
        let view = Arc::new(CommittedView::new());

        let reader = {
            let view = Arc::clone(&view);
            thread::spawn(move || {
                let mut last = 0u32;
                for _ in 0..10_000 {
                    if let Some(committed) = view.latest() {
                        assert!(committed.tick.0 >= last);
                        assert_eq!(committed.value, committed.tick.0 * 2);
                        last = committed.tick.0;
                    }
                }
            })
        };

        for tick in 1..=1_000u32 {
            view.publish(Tick(tick), tick * 2);
        }
        reader.join().unwrap();
    }
}
