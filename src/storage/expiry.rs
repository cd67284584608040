//! Active Expiration by Sampling
//!
//! Lazy expiration (dropping a dead key when something next touches it) is
//! not enough on its own: keys nobody reads again would pin memory forever.
//! Each shard therefore runs a periodic active sweep over its expiry table.
//!
//! A sweep works in rounds. One round samples at most
//! [`ExpiryConfig::sample_size`] entries at random positions across the
//! expiry table, deletes the
//! ones already past their deadline, and measures the expired fraction of the
//! sample. While that fraction stays at or above
//! [`ExpiryConfig::repeat_threshold`], the table is assumed to still be rich
//! in dead keys and another round runs immediately; once a round comes back
//! mostly alive, the sweep stops until the next scheduled tick.
//!
//! Every repeating round deletes at least one key, so a sweep always
//! terminates, even when the entire table is expired.

use tokio::time::{Duration, Instant};

use crate::storage::store::{sample_positions, ShardStore};

/// Tuning for the active expiration sweep.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Expiry-table entries examined per round.
    pub sample_size: usize,
    /// Minimum expired fraction of a sample that triggers another round.
    pub repeat_threshold: f64,
    /// Delay between scheduled sweeps on an idle shard.
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sample_size: 20,
            repeat_threshold: 0.25,
            interval: Duration::from_millis(100),
        }
    }
}

/// What one sweep accomplished. Shards log this at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Rounds executed (rounds that sampled nothing are not counted).
    pub rounds: usize,
    /// Total entries sampled across all rounds.
    pub sampled: usize,
    /// Total keys deleted.
    pub expired: usize,
}

/// Runs one active expiration sweep against `store`.
pub fn sweep_expired(store: &mut ShardStore, config: &ExpiryConfig) -> SweepStats {
    let mut stats = SweepStats::default();
    if config.sample_size == 0 {
        return stats;
    }

    loop {
        let now = Instant::now();

        // Sample at random positions across the whole expiry table. A fixed
        // window would let live keys pin it and strand expired keys beyond
        // its edge forever.
        let picked = sample_positions(store.expiries.len(), config.sample_size);
        if picked.is_empty() {
            break;
        }
        let sampled = picked.len();

        let dead: Vec<String> = store
            .expiries
            .iter()
            .enumerate()
            .filter(|(i, _)| picked.contains(i))
            .filter(|(_, (_, at))| now >= **at)
            .map(|(_, (key, _))| key.clone())
            .collect();

        for key in &dead {
            store.data.remove(key);
            store.expiries.remove(key);
        }

        stats.rounds += 1;
        stats.sampled += sampled;
        stats.expired += dead.len();

        // A round that found nothing must not repeat, whatever the
        // threshold: each continuing round shrinks the table by at least
        // one entry, which is what bounds the sweep.
        let fraction = dead.len() as f64 / sampled as f64;
        if dead.is_empty() || fraction < config.repeat_threshold {
            break;
        }
    }

    stats
}
