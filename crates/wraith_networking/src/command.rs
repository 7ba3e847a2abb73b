//! # Command Buffer
//!
//! Tick-indexed ring of per-tick input for one controlled ghost.
//!
//! ```text
//! capacity 8, slot = tick % 8
//!
//!   slot:   0    1    2    3    4    5    6    7
//!         [ 96][ 97][ 98][ 99][100][101][ 94][ 95]
//!                                         ▲
//!               put(tick 102) overwrites ─┘ tick 94
//! ```
//!
//! Each slot remembers the tick it holds, so a lookup only hits when the
//! slot holds exactly the requested tick. A miss is not an error: the
//! simulation applies [`Command::neutral`] for that tick.
//!
//! One producer writes a given tick (the owning client, or the server
//! recording what it received). Read-after-write ordering comes from the
//! fixed tick schedule, not from the buffer.

use crate::tick::Tick;

/// One tick of player input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Tick the input applies to.
    pub tick: Tick,
    /// Turn axis, `-1..=1` in practice.
    pub horizontal: i8,
    /// Thrust axis, `-1..=1` in practice.
    pub vertical: i8,
}

impl Command {
    /// Creates a command.
    #[inline]
    #[must_use]
    pub const fn new(tick: Tick, horizontal: i8, vertical: i8) -> Self {
        Self {
            tick,
            horizontal,
            vertical,
        }
    }

    /// No input for `tick`.
    #[inline]
    #[must_use]
    pub const fn neutral(tick: Tick) -> Self {
        Self::new(tick, 0, 0)
    }

    /// True if no axis is deflected.
    #[inline]
    #[must_use]
    pub const fn is_neutral(&self) -> bool {
        self.horizontal == 0 && self.vertical == 0
    }
}

/// Fixed-capacity ring of commands indexed by tick.
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    slots: Box<[Option<Command>]>,
    mask: u32,
}

impl CommandBuffer {
    /// Creates a buffer; `capacity` is rounded up to a power of two (min 2).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(2, 1 << 31).next_power_of_two();
        #[allow(clippy::cast_possible_truncation)]
        let mask = (capacity - 1) as u32;
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            mask,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, tick: Tick) -> usize {
        (tick.0 & self.mask) as usize
    }

    /// Stores `command` in its tick's slot, replacing whatever was there.
    pub fn put(&mut self, command: Command) {
        let slot = self.slot(command.tick);
        self.slots[slot] = Some(command);
    }

    /// The command stored for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<Command> {
        self.slots[self.slot(tick)].filter(|command| command.tick == tick)
    }

    /// The command for `tick`, or neutral input on a miss.
    #[must_use]
    pub fn get_or_neutral(&self, tick: Tick) -> Command {
        self.get(tick).unwrap_or_else(|| Command::neutral(tick))
    }

    /// Commands for the ticks after `from` up to and including `to`.
    ///
    /// Missing ticks yield neutral input. Empty if `to` is not after `from`.
    pub fn replay(&self, from: Tick, to: Tick) -> impl Iterator<Item = Command> + '_ {
        #[allow(clippy::cast_sign_loss)]
        let count = to.diff(from).max(0) as u32;
        (1..=count).map(move |step| self.get_or_neutral(from.wrapping_add(step)))
    }

    /// Forgets every stored command.
    pub fn clear(&mut self) {
        self.slots.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_put() {
        let mut buffer = CommandBuffer::new(32);
        let command = Command::new(Tick(100), 1, -1);
        buffer.put(command);
        assert_eq!(buffer.get(Tick(100)), Some(command));
        assert_eq!(buffer.get(Tick(101)), None);
    }

    #[test]
    fn test_eviction_after_capacity() {
        let mut buffer = CommandBuffer::new(32);
        buffer.put(Command::new(Tick(100), 1, 1));
        for tick in 101..=132 {
            buffer.put(Command::new(Tick(tick), 0, 1));
        }
        // Tick 132 landed in tick 100's slot.
        assert_eq!(buffer.get(Tick(100)), None);
        assert_eq!(buffer.get(Tick(132)), Some(Command::new(Tick(132), 0, 1)));
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(CommandBuffer::new(0).capacity(), 2);
        assert_eq!(CommandBuffer::new(32).capacity(), 32);
        assert_eq!(CommandBuffer::new(33).capacity(), 64);
    }

    #[test]
    fn test_slots_are_consistent_across_wrap() {
        let mut buffer = CommandBuffer::new(16);
        let before = Tick(u32::MAX);
        let after = before.wrapping_add(1);
        buffer.put(Command::new(before, 1, 0));
        buffer.put(Command::new(after, -1, 0));
        assert_eq!(buffer.get(before).map(|c| c.horizontal), Some(1));
        assert_eq!(buffer.get(after).map(|c| c.horizontal), Some(-1));
    }

    #[test]
    fn test_miss_is_neutral() {
        let buffer = CommandBuffer::new(8);
        let command = buffer.get_or_neutral(Tick(5));
        assert!(command.is_neutral());
        assert_eq!(command.tick, Tick(5));
    }

    #[test]
    fn test_replay_fills_gaps() {
        let mut buffer = CommandBuffer::new(8);
        buffer.put(Command::new(Tick(11), 1, 1));
        buffer.put(Command::new(Tick(13), -1, 0));

        let replayed: Vec<Command> = buffer.replay(Tick(10), Tick(13)).collect();
        assert_eq!(
            replayed,
            vec![
                Command::new(Tick(11), 1, 1),
                Command::neutral(Tick(12)),
                Command::new(Tick(13), -1, 0),
            ]
        );
        assert_eq!(buffer.replay(Tick(13), Tick(13)).count(), 0);
        assert_eq!(buffer.replay(Tick(13), Tick(10)).count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut buffer = CommandBuffer::new(4);
        buffer.put(Command::new(Tick(1), 1, 1));
        buffer.clear();
        assert_eq!(buffer.get(Tick(1)), None);
    }
}
