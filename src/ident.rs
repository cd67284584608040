//! Lock-Free Correlation ID Generator
//!
//! Every operation sent to a shard carries a request ID so the eventual
//! response can be matched back to the waiter that produced it. This module
//! generates those IDs without any locking: one atomic counter per logical
//! actor (a worker or a shard), packed into a fixed 32-bit layout.
//!
//! ## Bit Layout
//!
//! ```text
//!  31                               0
//!  ┌──────────┬────────┬────────────┐
//!  │ actor ID │  turn  │  counter   │
//!  │  8 bits  │ 4 bits │  20 bits   │
//!  └──────────┴────────┴────────────┘
//! ```
//!
//! The counter increments on every ID. When it exhausts its bit width, the
//! turn advances (wrapping at its own width) and the wraparound is recorded
//! in a per-(actor, turn) cycle table. A raw 32-bit ID is therefore unique
//! per actor only until the counter wraps; [`IdGenerator::expand_id`]
//! prefixes the raw ID with the recorded cycle count for its actor/turn pair,
//! producing a 64-bit value that stays unique for the life of the process.
//!
//! ## Concurrency
//!
//! All state is atomic. The rolling counter uses `fetch_add`, so concurrent
//! callers sharing an actor slot still receive distinct values. A cycle-table
//! slot is written only by the single caller that observed the counter enter
//! a new turn, so no cross-actor synchronization exists anywhere.

use std::sync::atomic::{AtomicU32, Ordering};

/// Bits reserved for the actor ID in the default layout.
pub const ACTOR_BITS: u32 = 8;

/// Bits reserved for the turn in the default layout.
pub const TURN_BITS: u32 = 4;

/// Bits reserved for the per-actor counter in the default layout.
pub const COUNTER_BITS: u32 = 20;

/// The bit widths of one ID layout.
///
/// The default layout is `ACTOR_BITS`/`TURN_BITS`/`COUNTER_BITS`. Tests use
/// deliberately tiny widths to force counter wraparound quickly; the three
/// widths must each be at least 1 and sum to at most 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdLayout {
    /// Bits for the actor ID (capacity = 2^actor_bits actors).
    pub actor_bits: u32,
    /// Bits for the turn.
    pub turn_bits: u32,
    /// Bits for the monotonically increasing counter.
    pub counter_bits: u32,
}

impl IdLayout {
    /// The production layout: 8-bit actor, 4-bit turn, 20-bit counter.
    pub const DEFAULT: IdLayout = IdLayout {
        actor_bits: ACTOR_BITS,
        turn_bits: TURN_BITS,
        counter_bits: COUNTER_BITS,
    };

    /// Number of distinct actor IDs this layout can address.
    #[inline]
    pub fn actor_capacity(&self) -> u32 {
        1 << self.actor_bits
    }

    /// Number of turn slots per actor.
    #[inline]
    fn turn_slots(&self) -> u32 {
        1 << self.turn_bits
    }

    /// Width of the rolling portion (turn + counter) of an ID.
    #[inline]
    fn rolling_bits(&self) -> u32 {
        self.turn_bits + self.counter_bits
    }

    #[inline]
    fn counter_mask(&self) -> u32 {
        (1 << self.counter_bits) - 1
    }

    #[inline]
    fn turn_mask(&self) -> u32 {
        self.turn_slots() - 1
    }

    #[inline]
    fn rolling_mask(&self) -> u32 {
        (1 << self.rolling_bits()) - 1
    }
}

/// Lock-free generator of correlation IDs.
///
/// One instance is shared by the whole process; workers draw IDs from their
/// assigned actor slot, and responses are matched back by the same value.
///
/// # Example
///
/// ```
/// use riftdb::ident::IdGenerator;
///
/// let ids = IdGenerator::new();
/// let a = ids.next_id(3);
/// let b = ids.next_id(3);
/// assert_ne!(a, b);
/// assert_ne!(ids.expand_id(a), ids.expand_id(b));
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    layout: IdLayout,
    /// One rolling (turn ++ counter) sequence per actor.
    seq: Vec<AtomicU32>,
    /// Cycle counts, indexed by actor * turn_slots + turn.
    cycles: Vec<AtomicU32>,
}

impl IdGenerator {
    /// Creates a generator with the default production layout.
    pub fn new() -> Self {
        Self::with_layout(IdLayout::DEFAULT)
    }

    /// Creates a generator with an explicit layout.
    ///
    /// # Panics
    ///
    /// Panics if any width is zero or the widths sum to more than 32 bits.
    pub fn with_layout(layout: IdLayout) -> Self {
        assert!(
            layout.actor_bits >= 1 && layout.turn_bits >= 1 && layout.counter_bits >= 1,
            "id layout widths must each be at least 1 bit"
        );
        assert!(
            layout.actor_bits + layout.turn_bits + layout.counter_bits <= 32,
            "id layout widths must fit in 32 bits"
        );

        let actors = layout.actor_capacity() as usize;
        let slots = actors * layout.turn_slots() as usize;

        Self {
            layout,
            seq: (0..actors).map(|_| AtomicU32::new(0)).collect(),
            cycles: (0..slots).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Returns the layout this generator was built with.
    pub fn layout(&self) -> IdLayout {
        self.layout
    }

    /// Returns the next raw 32-bit ID for `actor`.
    ///
    /// The result is unique among IDs drawn from the same actor slot until
    /// the counter wraps; combine with [`expand_id`](Self::expand_id) for
    /// process-lifetime uniqueness.
    ///
    /// # Panics
    ///
    /// Panics if `actor` is outside the layout's actor capacity. That is a
    /// programming error at the call site, not a runtime condition.
    pub fn next_id(&self, actor: u32) -> u32 {
        assert!(
            actor < self.layout.actor_capacity(),
            "actor id {} out of range for {}-bit actor field",
            actor,
            self.layout.actor_bits
        );

        let n = self.seq[actor as usize].fetch_add(1, Ordering::Relaxed);

        // The counter re-entering zero marks the start of a new turn. Exactly
        // one caller observes each such crossing, so the slot has one writer.
        if n & self.layout.counter_mask() == 0 {
            let turn = (n >> self.layout.counter_bits) & self.layout.turn_mask();
            let cycle = n >> self.layout.rolling_bits();
            self.cycles[self.cycle_slot(actor, turn)].store(cycle, Ordering::Release);
        }

        (actor << self.layout.rolling_bits()) | (n & self.layout.rolling_mask())
    }

    /// Expands a raw ID into a 64-bit value unique for the process lifetime.
    ///
    /// The low 32 bits are the raw ID; the high bits are the cycle count
    /// recorded when the ID's (actor, turn) slot was last entered. Expansion
    /// is meaningful while the ID is still live; once its turn slot has been
    /// re-entered a full turn cycle later, the prefix has moved on.
    pub fn expand_id(&self, id: u32) -> u64 {
        let actor = id >> self.layout.rolling_bits();
        let turn = (id >> self.layout.counter_bits) & self.layout.turn_mask();
        let cycle = self.cycles[self.cycle_slot(actor, turn)].load(Ordering::Acquire);

        (u64::from(cycle) << 32) | u64::from(id)
    }

    #[inline]
    fn cycle_slot(&self, actor: u32, turn: u32) -> usize {
        (actor * self.layout.turn_slots() + turn) as usize
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// A layout small enough to wrap in a handful of calls:
    /// 4 actors, 4 turns, 8 IDs per turn.
    fn tiny() -> IdLayout {
        IdLayout {
            actor_bits: 2,
            turn_bits: 2,
            counter_bits: 3,
        }
    }

    #[test]
    fn test_ids_distinct_before_wraparound() {
        let ids = IdGenerator::new();
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            assert!(seen.insert(ids.next_id(1)));
        }
    }

    #[test]
    fn test_actor_prefix_separates_actors() {
        let ids = IdGenerator::new();

        let a = ids.next_id(0);
        let b = ids.next_id(1);
        let rolling = IdLayout::DEFAULT.rolling_bits();

        assert_eq!(a >> rolling, 0);
        assert_eq!(b >> rolling, 1);
    }

    #[test]
    fn test_raw_ids_repeat_after_full_cycle() {
        let ids = IdGenerator::with_layout(tiny());

        // 4 turns x 8 counter values = 32 raw IDs before the space repeats.
        let first: Vec<u32> = (0..32).map(|_| ids.next_id(2)).collect();
        let second: Vec<u32> = (0..32).map(|_| ids.next_id(2)).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_expanded_ids_unique_across_wraparound() {
        let ids = IdGenerator::with_layout(tiny());
        let mut seen = HashSet::new();

        // Four full cycles of the raw space. Expanding immediately (while the
        // turn is live) must keep every value distinct.
        for _ in 0..128 {
            let raw = ids.next_id(0);
            assert!(seen.insert(ids.expand_id(raw)), "duplicate expanded id");
        }
    }

    #[test]
    fn test_concurrent_same_actor_ids_distinct() {
        let ids = Arc::new(IdGenerator::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let ids = Arc::clone(&ids);
            handles.push(std::thread::spawn(move || {
                (0..5_000).map(|_| ids.next_id(7)).collect::<Vec<u32>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "two threads drew the same id");
            }
        }
        assert_eq!(seen.len(), 20_000);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_actor_out_of_range_panics() {
        let ids = IdGenerator::new();
        ids.next_id(IdLayout::DEFAULT.actor_capacity());
    }

    #[test]
    #[should_panic(expected = "fit in 32 bits")]
    fn test_oversized_layout_rejected() {
        IdGenerator::with_layout(IdLayout {
            actor_bits: 16,
            turn_bits: 8,
            counter_bits: 16,
        });
    }
}
