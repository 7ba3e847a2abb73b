//! # Baselines
//!
//! Snapshot histories used as delta references.
//!
//! - Client: every ghost keeps a [`SnapshotHistory`] of snapshots it
//!   received. Frames name their baseline by tick, and the client decodes
//!   against exactly that entry.
//! - Server: each connection keeps a [`SentHistory`] of what it sent per
//!   tick. When the client acks a tick, those snapshots become the
//!   connection's baselines in the [`BaselineStore`], two per ghost.
//!
//! Everything is owned by the driver that uses it. Dropping a connection
//! drops its baselines.

use std::collections::{HashMap, VecDeque};

use crate::server::ConnectionId;
use crate::snapshot::{GhostId, GhostState};
use crate::tick::Tick;

/// Bounded per-ghost history, newest first.
#[derive(Clone, Debug)]
pub struct SnapshotHistory {
    entries: VecDeque<GhostState>,
    capacity: usize,
}

impl SnapshotHistory {
    /// Creates an empty history holding at most `capacity` snapshots (min 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of stored snapshots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts by tick order. Replaces an entry with the same tick.
    ///
    /// When full, the oldest entry is evicted; a snapshot older than
    /// everything in a full history is dropped instead.
    pub fn insert(&mut self, state: GhostState) {
        let tick = state.tick();
        let position = self
            .entries
            .iter()
            .position(|existing| !existing.tick().is_newer_than(tick));

        match position {
            Some(i) if self.entries[i].tick() == tick => self.entries[i] = state,
            Some(i) => self.entries.insert(i, state),
            // Older than everything in a full history.
            None if self.entries.len() == self.capacity => {}
            None => self.entries.push_back(state),
        }
        self.entries.truncate(self.capacity);
    }

    /// The snapshot for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&GhostState> {
        self.entries.iter().find(|state| state.tick() == tick)
    }

    /// Newest snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<&GhostState> {
        self.entries.front()
    }

    /// The two newest snapshots.
    #[must_use]
    pub fn latest_two(&self) -> (Option<&GhostState>, Option<&GhostState>) {
        (self.entries.front(), self.entries.get(1))
    }

    /// Iterates newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &GhostState> + '_ {
        self.entries.iter()
    }

    /// State at `tick`: the received snapshot if present, otherwise a
    /// prediction from the two newest snapshots.
    ///
    /// `None` only if the history is empty.
    #[must_use]
    pub fn state_at(&self, tick: Tick) -> Option<GhostState> {
        if let Some(exact) = self.get(tick) {
            return Some(exact.clone());
        }
        let (first, second) = self.latest_two();
        first.map(|current| current.predict(tick, first, second))
    }

    /// Newest snapshot no older than `max_age` ticks before `now`.
    ///
    /// Snapshots at or after `now` are not valid baselines.
    #[must_use]
    pub fn usable_baseline(&self, now: Tick, max_age: u32) -> Option<&GhostState> {
        self.entries.iter().find(|state| {
            let age = now.diff(state.tick());
            age > 0 && i64::from(age) <= i64::from(max_age)
        })
    }
}

/// Snapshots sent to one connection at one tick.
#[derive(Clone, Debug)]
pub struct SentFrame {
    /// Frame tick.
    pub tick: Tick,
    /// Ghost states as encoded.
    pub ghosts: Vec<(GhostId, GhostState)>,
}

/// Ring of recently sent frames awaiting acknowledgement.
#[derive(Clone, Debug)]
pub struct SentHistory {
    frames: VecDeque<SentFrame>,
    capacity: usize,
}

impl SentHistory {
    /// Keeps up to `capacity` unacknowledged frames (min 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a sent frame, evicting the oldest when full.
    pub fn record(&mut self, frame: SentFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Frames still waiting for an ack.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Removes and returns the frame for `tick`, along with every older one.
    ///
    /// `None` if that tick is unknown (too old, or never sent).
    pub fn acknowledge(&mut self, tick: Tick) -> Option<SentFrame> {
        let index = self.frames.iter().position(|frame| frame.tick == tick)?;
        let mut acked = self.frames.drain(..=index);
        acked.next_back()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Acknowledged baselines per `(connection, ghost)`.
#[derive(Clone, Debug)]
pub struct BaselineStore {
    histories: HashMap<(ConnectionId, GhostId), SnapshotHistory>,
    per_ghost: usize,
}

impl BaselineStore {
    /// Acked baselines kept per ghost.
    ///
    /// [`BaselineStore::choose`] only ever returns one. The older entry is
    /// the fallback when the newest ack is for the tick being built, which
    /// is not a valid baseline.
    pub const PER_GHOST: usize = 2;

    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            histories: HashMap::new(),
            per_ghost: Self::PER_GHOST,
        }
    }

    /// Promotes an acknowledged snapshot to baseline.
    pub fn promote(&mut self, connection: ConnectionId, ghost: GhostId, state: GhostState) {
        let per_ghost = self.per_ghost;
        self.histories
            .entry((connection, ghost))
            .or_insert_with(|| SnapshotHistory::new(per_ghost))
            .insert(state);
    }

    /// Baseline history for one ghost on one connection.
    #[must_use]
    pub fn history(&self, connection: ConnectionId, ghost: GhostId) -> Option<&SnapshotHistory> {
        self.histories.get(&(connection, ghost))
    }

    /// Baseline to encode against at `now`, if one is recent enough.
    #[must_use]
    pub fn choose(
        &self,
        connection: ConnectionId,
        ghost: GhostId,
        now: Tick,
        max_age: u32,
    ) -> Option<&GhostState> {
        self.history(connection, ghost)?.usable_baseline(now, max_age)
    }

    /// Drops one ghost's baselines on one connection.
    pub fn remove_ghost(&mut self, connection: ConnectionId, ghost: GhostId) {
        self.histories.remove(&(connection, ghost));
    }

    /// Drops every baseline of a connection.
    pub fn remove_connection(&mut self, connection: ConnectionId) {
        self.histories.retain(|(owner, _), _| *owner != connection);
    }

    /// Number of tracked `(connection, ghost)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// True if no baselines are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AvatarSnapshot, ChangeMask};

    fn avatar(tick: u32, x: i32) -> GhostState {
        GhostState::Avatar(AvatarSnapshot {
            tick: Tick(tick),
            rotation: 0,
            position: [x, 0, 0],
            mask: ChangeMask::EMPTY,
        })
    }

    fn ticks(history: &SnapshotHistory) -> Vec<u32> {
        history.iter().map(|s| s.tick().0).collect()
    }

    #[test]
    fn test_history_orders_newest_first() {
        let mut history = SnapshotHistory::new(4);
        history.insert(avatar(10, 0));
        history.insert(avatar(12, 0));
        history.insert(avatar(11, 0));
        assert_eq!(ticks(&history), vec![12, 11, 10]);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = SnapshotHistory::new(3);
        for tick in 1..=5 {
            history.insert(avatar(tick, 0));
        }
        assert_eq!(ticks(&history), vec![5, 4, 3]);

        // Older than everything in a full history.
        history.insert(avatar(2, 0));
        assert_eq!(ticks(&history), vec![5, 4, 3]);

        // Between entries: the oldest goes.
        let mut history = SnapshotHistory::new(3);
        history.insert(avatar(10, 0));
        history.insert(avatar(20, 0));
        history.insert(avatar(30, 0));
        history.insert(avatar(15, 0));
        assert_eq!(ticks(&history), vec![30, 20, 15]);
    }

    #[test]
    fn test_history_replaces_same_tick() {
        let mut history = SnapshotHistory::new(3);
        history.insert(avatar(7, 1));
        history.insert(avatar(7, 2));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(Tick(7)), Some(&avatar(7, 2)));
    }

    #[test]
    fn test_history_across_tick_wrap() {
        let mut history = SnapshotHistory::new(4);
        history.insert(avatar(u32::MAX, 0));
        history.insert(avatar(1, 0));
        history.insert(avatar(0, 0));
        assert_eq!(ticks(&history), vec![1, 0, u32::MAX]);
    }

    #[test]
    fn test_state_at_predicts_gap() {
        let mut history = SnapshotHistory::new(4);
        assert!(history.state_at(Tick(11)).is_none());

        history.insert(avatar(10, 200));
        history.insert(avatar(12, 400));
        assert_eq!(history.state_at(Tick(12)), Some(avatar(12, 400)));
        assert_eq!(history.state_at(Tick(11)), Some(avatar(11, 300)));
        assert_eq!(history.state_at(Tick(13)), Some(avatar(13, 500)));
    }

    #[test]
    fn test_usable_baseline_respects_age() {
        let mut history = SnapshotHistory::new(2);
        history.insert(avatar(10, 0));
        history.insert(avatar(14, 0));
        assert_eq!(history.usable_baseline(Tick(15), 8).map(GhostState::tick), Some(Tick(14)));
        assert_eq!(history.usable_baseline(Tick(14), 8).map(GhostState::tick), Some(Tick(10)));
        assert!(history.usable_baseline(Tick(40), 8).is_none());
    }

    #[test]
    fn test_sent_history_acknowledge() {
        let mut sent = SentHistory::new(3);
        for tick in 1..=4 {
            sent.record(SentFrame {
                tick: Tick(tick),
                ghosts: vec![(GhostId(1), avatar(tick, 0))],
            });
        }
        assert_eq!(sent.pending(), 3);
        // Tick 1 was evicted.
        assert!(sent.acknowledge(Tick(1)).is_none());

        let frame = sent.acknowledge(Tick(3)).unwrap();
        assert_eq!(frame.tick, Tick(3));
        assert_eq!(sent.pending(), 1);
        assert!(sent.acknowledge(Tick(2)).is_none());
    }

    #[test]
    fn test_baseline_store_isolates_connections() {
        let mut store = BaselineStore::new();
        let (a, b) = (ConnectionId(1), ConnectionId(2));
        store.promote(a, GhostId(1), avatar(5, 0));
        store.promote(a, GhostId(1), avatar(6, 0));
        store.promote(a, GhostId(1), avatar(7, 0));
        store.promote(b, GhostId(1), avatar(6, 0));

        assert_eq!(store.history(a, GhostId(1)).map(SnapshotHistory::len), Some(2));
        assert_eq!(store.choose(a, GhostId(1), Tick(8), 8).map(GhostState::tick), Some(Tick(7)));

        // Newest is at the build tick, so the older one is used.
        assert_eq!(store.choose(a, GhostId(1), Tick(7), 8).map(GhostState::tick), Some(Tick(6)));

        store.remove_connection(a);
        assert!(store.history(a, GhostId(1)).is_none());
        assert!(store.history(b, GhostId(1)).is_some());
        assert_eq!(store.len(), 1);
    }
}
