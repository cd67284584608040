//! Shard-Local Key-Value Store
//!
//! Each shard owns exactly one [`ShardStore`]. All access goes through the
//! shard's executor task, so the store is written for a single caller and
//! uses no interior locking at all:
//!
//! ```text
//!   Shard executor (one task)
//!        │
//!        ▼
//!   ShardStore
//!     ├── data:     key → Object (value + last-accessed tick)
//!     ├── expiries: key → deadline (only keys with a TTL)
//!     └── clock:    logical tick, bumped on each access
//! ```
//!
//! ## Expiration
//!
//! Expiry deadlines live in a side table so most keys pay nothing for TTL
//! support. A key past its deadline is treated as absent everywhere and is
//! physically removed either lazily on the next lookup or by the periodic
//! sampling sweep (see [`expiry`](crate::storage::expiry)).
//!
//! ## Capacity
//!
//! The store holds at most `capacity` keys. Inserting a new key at capacity
//! first runs the configured eviction policy (see
//! [`eviction`](crate::storage::eviction)), which always frees at least one
//! slot, so the bound holds after every operation.

use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash, Hasher};
use tokio::time::Instant;

use crate::storage::eviction::EvictionPolicy;
use crate::storage::object::Object;

/// The keyed storage owned by a single shard.
#[derive(Debug)]
pub struct ShardStore {
    /// Live objects. May transiently contain keys past their deadline until
    /// a lookup or sweep removes them.
    pub(crate) data: HashMap<String, Object>,
    /// Expiry deadlines for the subset of keys that have one.
    pub(crate) expiries: HashMap<String, Instant>,
    /// Hard bound on the number of keys.
    pub(crate) capacity: usize,
    /// Policy used when an insert needs space.
    pub(crate) policy: EvictionPolicy,
    /// Fraction of capacity reclaimed per eviction pass.
    pub(crate) eviction_ratio: f64,
    /// Logical access clock. Single-writer, wraps around.
    pub(crate) clock: u32,
}

impl ShardStore {
    /// Creates an empty store bounded at `capacity` keys.
    pub fn new(capacity: usize, policy: EvictionPolicy, eviction_ratio: f64) -> Self {
        Self {
            data: HashMap::new(),
            expiries: HashMap::new(),
            capacity: capacity.max(1),
            policy,
            eviction_ratio,
            clock: 0,
        }
    }

    /// Advances the logical clock and returns the new tick.
    #[inline]
    pub(crate) fn tick(&mut self) -> u32 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    /// Inserts or replaces `key`.
    ///
    /// A brand-new key at capacity evicts first, so the store never exceeds
    /// its bound. Replacing an existing key drops any expiry it had; callers
    /// that need to preserve the deadline capture it beforehand.
    pub fn put(&mut self, key: String, value: impl Into<Object>) {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_for_space();
        }
        let now = self.tick();
        let mut obj: Object = value.into();
        obj.touch(now);
        self.expiries.remove(&key);
        self.data.insert(key, obj);
    }

    /// Looks up `key`, refreshing its last-accessed tick.
    ///
    /// A key past its deadline is removed here and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<&Object> {
        if self.has_expired(key) {
            self.data.remove(key);
            self.expiries.remove(key);
            return None;
        }
        let now = self.tick();
        match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch(now);
                Some(&*obj)
            }
            None => None,
        }
    }

    /// Removes `key` and its deadline. Returns whether a live key was
    /// actually removed.
    pub fn del(&mut self, key: &str) -> bool {
        let was_live = !self.has_expired(key);
        self.expiries.remove(key);
        self.data.remove(key).is_some() && was_live
    }

    /// True when `key` exists and is not past its deadline. Does not refresh
    /// the access tick.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key) && !self.has_expired(key)
    }

    /// Sets the expiry deadline for an existing key. Returns false when the
    /// key is absent.
    pub fn set_expiry(&mut self, key: &str, at: Instant) -> bool {
        if !self.contains(key) {
            return false;
        }
        self.expiries.insert(key.to_string(), at);
        true
    }

    /// Removes the expiry deadline from `key`, making it persistent. Returns
    /// whether a deadline was present.
    pub fn clear_expiry(&mut self, key: &str) -> bool {
        self.expiries.remove(key).is_some()
    }

    /// The deadline currently set on `key`, if any.
    pub fn expiry_of(&self, key: &str) -> Option<Instant> {
        self.expiries.get(key).copied()
    }

    /// All live keys matching a glob pattern (`*`, `?`, `[a-z]`, `[^x]`).
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let glob: Vec<char> = pattern.chars().collect();
        self.data
            .keys()
            .filter(|key| !self.has_expired(key))
            .filter(|key| {
                let text: Vec<char> = key.chars().collect();
                glob_match(&glob, &text)
            })
            .cloned()
            .collect()
    }

    /// Number of live (non-expired) keys.
    pub fn key_count(&self) -> usize {
        self.data
            .keys()
            .filter(|key| !self.has_expired(key))
            .count()
    }

    /// Removes every key and deadline.
    pub fn clear(&mut self) {
        self.data.clear();
        self.expiries.clear();
    }

    /// Raw key count, expired stragglers included. Capacity checks use this.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the store holds no keys at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub(crate) fn has_expired(&self, key: &str) -> bool {
        self.expiries
            .get(key)
            .is_some_and(|at| Instant::now() >= *at)
    }
}

impl From<bytes::Bytes> for Object {
    fn from(value: bytes::Bytes) -> Self {
        Object::new(value, 0)
    }
}

// ===== SAMPLING =====

/// Draws up to `count` distinct positions in `0..len`.
///
/// Positions come from hashing a counter through a freshly seeded
/// `RandomState`, so repeated draws over an unchanged map land on different
/// entries instead of revisiting the same head window. The eviction and
/// expiry samplers both resolve these positions with a single scan.
pub(crate) fn sample_positions(len: usize, count: usize) -> HashSet<usize> {
    let count = count.min(len);
    let mut picked = HashSet::with_capacity(count);
    if count == 0 {
        return picked;
    }

    // Terminates because count <= len.
    let state = RandomState::new();
    let mut draw = 0u64;
    while picked.len() < count {
        let mut hasher = state.build_hasher();
        draw.hash(&mut hasher);
        picked.insert((hasher.finish() as usize) % len);
        draw += 1;
    }
    picked
}

// ===== GLOB MATCHING =====

/// Matches `text` against a glob `pattern`.
///
/// Supports `*` (any run), `?` (any one char), character classes `[abc]`,
/// ranges `[a-z]`, negation `[^...]`, and `\` escaping the next character.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // Try every split point, shortest match first.
            (0..=text.len()).any(|skip| glob_match(rest, &text[skip..]))
        }
        Some(('?', rest)) => match text.split_first() {
            Some((_, text_rest)) => glob_match(rest, text_rest),
            None => false,
        },
        Some(('[', rest)) => match text.split_first() {
            Some((c, text_rest)) => match class_match(rest, *c) {
                Some((hit, after_class)) => hit && glob_match(after_class, text_rest),
                // Unterminated class: treat the '[' literally.
                None => *c == '[' && glob_match(rest, text_rest),
            },
            None => false,
        },
        Some(('\\', rest)) if !rest.is_empty() => match text.split_first() {
            Some((c, text_rest)) => rest[0] == *c && glob_match(&rest[1..], text_rest),
            None => false,
        },
        Some((p, rest)) => match text.split_first() {
            Some((c, text_rest)) => p == c && glob_match(rest, text_rest),
            None => false,
        },
    }
}

/// Evaluates a character class starting just after `[`.
///
/// Returns whether `c` is in the class and the pattern remainder after the
/// closing `]`, or `None` when the class never closes.
fn class_match(class: &[char], c: char) -> Option<(bool, &[char])> {
    let (negated, mut i) = if class.first() == Some(&'^') {
        (true, 1)
    } else {
        (false, 0)
    };

    let mut hit = false;
    while i < class.len() {
        match class[i] {
            ']' => {
                return Some((hit != negated, &class[i + 1..]));
            }
            lo if i + 2 < class.len() && class[i + 1] == '-' && class[i + 2] != ']' => {
                if (lo..=class[i + 2]).contains(&c) {
                    hit = true;
                }
                i += 3;
            }
            ch => {
                if ch == c {
                    hit = true;
                }
                i += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::time::Duration;

    fn store() -> ShardStore {
        ShardStore::new(1024, EvictionPolicy::SimpleFirst, 0.1)
    }

    fn put(s: &mut ShardStore, key: &str, value: &str) {
        s.put(key.to_string(), Bytes::copy_from_slice(value.as_bytes()));
    }

    #[test]
    fn test_put_and_get() {
        let mut s = store();
        put(&mut s, "name", "rift");
        assert_eq!(s.get("name").map(|o| o.value.clone()), Some(Bytes::from("rift")));
        assert_eq!(s.get("missing"), None);
    }

    #[test]
    fn test_get_refreshes_last_accessed() {
        let mut s = store();
        put(&mut s, "k", "v");
        let first = s.get("k").map(|o| o.last_accessed);
        let second = s.get("k").map(|o| o.last_accessed);
        assert!(second > first);
    }

    #[test]
    fn test_del_removes_key_and_deadline() {
        let mut s = store();
        put(&mut s, "k", "v");
        s.set_expiry("k", Instant::now() + Duration::from_secs(60));
        assert!(s.del("k"));
        assert!(!s.del("k"));
        assert_eq!(s.expiry_of("k"), None);
    }

    #[test]
    fn test_overwrite_drops_expiry() {
        let mut s = store();
        put(&mut s, "k", "v1");
        s.set_expiry("k", Instant::now() + Duration::from_secs(60));
        put(&mut s, "k", "v2");
        assert_eq!(s.expiry_of("k"), None);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut s = ShardStore::new(4, EvictionPolicy::SimpleFirst, 0.25);
        for i in 0..32 {
            put(&mut s, &format!("key:{}", i), "v");
            assert!(s.len() <= 4, "store grew past capacity at insert {}", i);
        }
        // The freshly inserted key always survives its own insert.
        assert!(s.contains("key:31"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_key_reads_as_absent() {
        let mut s = store();
        put(&mut s, "k", "v");
        s.set_expiry("k", Instant::now() + Duration::from_millis(50));

        assert!(s.get("k").is_some());
        tokio::time::advance(Duration::from_millis(51)).await;

        assert!(s.get("k").is_none());
        // Lazy removal purged the raw entry too.
        assert_eq!(s.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_count_skips_expired() {
        let mut s = store();
        put(&mut s, "a", "1");
        put(&mut s, "b", "2");
        s.set_expiry("b", Instant::now() + Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(s.key_count(), 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_clear_expiry_makes_key_persistent() {
        let mut s = store();
        put(&mut s, "k", "v");
        s.set_expiry("k", Instant::now() + Duration::from_secs(5));
        assert!(s.clear_expiry("k"));
        assert_eq!(s.expiry_of("k"), None);
        assert!(!s.clear_expiry("k"));
    }

    #[test]
    fn test_keys_glob_patterns() {
        let mut s = store();
        for key in ["user:1", "user:2", "session:1", "ufo"] {
            put(&mut s, key, "v");
        }

        let mut users = s.keys("user:*");
        users.sort();
        assert_eq!(users, vec!["user:1", "user:2"]);

        assert_eq!(s.keys("user:?").len(), 2);
        assert_eq!(s.keys("*").len(), 4);

        let mut classed = s.keys("u[sf]*");
        classed.sort();
        assert_eq!(classed, vec!["ufo", "user:1", "user:2"]);

        assert_eq!(s.keys("[^u]*").len(), 1);
    }

    #[test]
    fn test_glob_escape_and_ranges() {
        let mut s = store();
        put(&mut s, "a*b", "v");
        put(&mut s, "axb", "v");
        put(&mut s, "k5", "v");

        assert_eq!(s.keys(r"a\*b"), vec!["a*b"]);
        assert_eq!(s.keys("k[0-9]"), vec!["k5"]);
        assert!(s.keys("k[a-z]").is_empty());
    }

    #[test]
    fn test_sample_positions_bounds() {
        assert!(sample_positions(0, 5).is_empty());
        assert_eq!(sample_positions(3, 10).len(), 3);

        let picked = sample_positions(100, 10);
        assert_eq!(picked.len(), 10);
        assert!(picked.iter().all(|p| *p < 100));
    }

    #[test]
    fn test_sample_positions_vary_between_draws() {
        // A fixed head window would return the same set every time.
        let a = sample_positions(1000, 10);
        let b = sample_positions(1000, 10);
        let c = sample_positions(1000, 10);
        assert!(a != b || b != c);
    }

    #[test]
    fn test_clear_empties_store() {
        let mut s = store();
        put(&mut s, "a", "1");
        put(&mut s, "b", "2");
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.key_count(), 0);
    }
}
