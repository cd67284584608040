//! Key Eviction Policies
//!
//! When an insert finds the store at capacity, one eviction pass runs before
//! the insert proceeds. A pass removes up to `ceil(eviction_ratio × capacity)`
//! keys (always at least one), so a store under write pressure reclaims space
//! in batches instead of evicting on every single insert.
//!
//! Three policies are supported:
//!
//! - `simple-first`: drop the first keys in iteration order. Cheapest;
//!   effectively arbitrary victims.
//! - `allkeys-random`: drop randomly chosen keys.
//! - `allkeys-lru`: approximate LRU. A bounded sample of keys is ranked by
//!   idle time in a small [`EvictionPool`]; the idlest sampled keys are
//!   dropped first. Hot keys have near-zero idle time and sink to the bottom
//!   of the pool, so they survive passes that sample them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::storage::store::{sample_positions, ShardStore};

/// Most-idle keys retained while scanning a sample.
pub(crate) const EVICTION_POOL_CAPACITY: usize = 16;

/// Keys examined per LRU eviction pass. Bounds the work a pass can do on a
/// large store; the pool keeps only the idlest of these.
const LRU_SAMPLE_SIZE: usize = 64;

/// How victims are chosen when the store needs space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// First keys in iteration order.
    SimpleFirst,
    /// Uniformly random keys.
    AllKeysRandom,
    /// Idlest keys within a bounded sample.
    AllKeysLru,
}

/// Error for an unrecognized policy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown eviction policy '{0}' (expected simple-first, allkeys-random or allkeys-lru)")]
pub struct UnknownPolicy(pub String);

impl FromStr for EvictionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple-first" => Ok(EvictionPolicy::SimpleFirst),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::SimpleFirst => "simple-first",
            EvictionPolicy::AllKeysRandom => "allkeys-random",
            EvictionPolicy::AllKeysLru => "allkeys-lru",
        };
        write!(f, "{}", name)
    }
}

impl ShardStore {
    /// Runs one eviction pass. Removes at least one key when the store is
    /// non-empty; callers rely on that to keep the capacity bound.
    pub(crate) fn evict_for_space(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let target = self.eviction_target();
        match self.policy {
            EvictionPolicy::SimpleFirst => self.evict_first(target),
            EvictionPolicy::AllKeysRandom => self.evict_random(target),
            EvictionPolicy::AllKeysLru => self.evict_lru(target),
        }
    }

    /// Keys to remove this pass: `ceil(ratio × capacity)`, at least one,
    /// never more than the store holds.
    fn eviction_target(&self) -> usize {
        let raw = (self.eviction_ratio * self.capacity as f64).ceil() as usize;
        raw.clamp(1, self.data.len())
    }

    fn evict_first(&mut self, target: usize) {
        let victims: Vec<String> = self.data.keys().take(target).cloned().collect();
        for key in victims {
            self.drop_key(&key);
        }
    }

    fn evict_random(&mut self, target: usize) {
        let picked = sample_positions(self.data.len(), target);
        let victims: Vec<String> = self
            .data
            .keys()
            .enumerate()
            .filter(|(i, _)| picked.contains(i))
            .map(|(_, key)| key.clone())
            .collect();
        for key in victims {
            self.drop_key(&key);
        }
    }

    fn evict_lru(&mut self, target: usize) {
        let now = self.clock;
        let picked = sample_positions(self.data.len(), LRU_SAMPLE_SIZE);

        let mut pool = EvictionPool::new(EVICTION_POOL_CAPACITY);
        for (i, (key, obj)) in self.data.iter().enumerate() {
            if picked.contains(&i) {
                pool.admit(key, obj.idle_since(now));
            }
        }

        for victim in pool.into_victims().into_iter().take(target) {
            self.drop_key(&victim);
        }
    }

    fn drop_key(&mut self, key: &str) {
        self.data.remove(key);
        self.expiries.remove(key);
    }
}

/// A bounded set of eviction candidates ranked by idle time.
///
/// The pool keeps the `capacity` idlest keys seen so far: while it has room
/// every candidate is admitted, and once full a candidate only enters by
/// displacing the least idle member it beats.
#[derive(Debug)]
pub(crate) struct EvictionPool {
    /// Sorted by idle time, most idle first.
    entries: Vec<PoolEntry>,
    capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PoolEntry {
    pub key: String,
    pub idle: u32,
}

impl EvictionPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Offers a candidate to the pool.
    pub(crate) fn admit(&mut self, key: &str, idle: u32) {
        if self.entries.len() >= self.capacity {
            match self.entries.last() {
                Some(least) if idle > least.idle => {
                    self.entries.pop();
                }
                _ => return,
            }
        }

        let pos = self.entries.partition_point(|e| e.idle >= idle);
        self.entries.insert(
            pos,
            PoolEntry {
                key: key.to_string(),
                idle,
            },
        );
    }

    /// Consumes the pool, yielding victim keys most idle first.
    pub(crate) fn into_victims(self) -> Vec<String> {
        self.entries.into_iter().map(|e| e.key).collect()
    }

    #[cfg(test)]
    fn idle_times(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.idle).collect()
    }
}
