//! Stored Object Representation
//!
//! Each key maps to an [`Object`]: the value bytes plus the logical-clock
//! tick at which the key was last touched. The tick feeds LRU eviction; it is
//! a store-local counter, not wall time, so it advances only when the owning
//! shard does work and wraps around after `u32::MAX` touches.

use bytes::Bytes;

/// A value stored under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// The value bytes. Cheap to clone; clones share the underlying buffer.
    pub value: Bytes,
    /// Logical-clock tick of the last access.
    pub last_accessed: u32,
}

impl Object {
    /// Creates an object stamped with the current clock tick.
    pub fn new(value: impl Into<Bytes>, now: u32) -> Self {
        Self {
            value: value.into(),
            last_accessed: now,
        }
    }

    /// Re-stamps the object as accessed at `now`.
    #[inline]
    pub fn touch(&mut self, now: u32) {
        self.last_accessed = now;
    }

    /// Ticks elapsed since the last access, given the current clock value.
    ///
    /// The clock wraps; when `now` has lapped `last_accessed` the distance is
    /// measured across the wrap point rather than reported as negative.
    #[inline]
    pub fn idle_since(&self, now: u32) -> u32 {
        if now >= self.last_accessed {
            now - self.last_accessed
        } else {
            (u32::MAX - self.last_accessed) + now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_time_simple() {
        let obj = Object::new("v", 10);
        assert_eq!(obj.idle_since(10), 0);
        assert_eq!(obj.idle_since(25), 15);
    }

    #[test]
    fn test_idle_time_across_clock_wrap() {
        let obj = Object::new("v", u32::MAX - 4);
        // Clock wrapped: 4 ticks to reach u32::MAX, then 3 more past zero.
        assert_eq!(obj.idle_since(3), 7);
    }

    #[test]
    fn test_touch_resets_idle() {
        let mut obj = Object::new("v", 0);
        obj.touch(90);
        assert_eq!(obj.idle_since(100), 10);
    }
}
