//! Runtime Configuration
//!
//! All tunables in one place: network binding, shard and client limits, the
//! eviction policy and the expiration sweep. Defaults are chosen so a bare
//! `Config::default()` runs a sensibly sized engine on the current machine;
//! the binary overrides them from command-line flags.

use std::process;
use std::str::FromStr;
use std::thread;

use anyhow::{bail, Result};
use tokio::time::Duration;

use crate::storage::EvictionPolicy;

/// Engine and server settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server binds to.
    pub host: String,
    /// Port the server listens on.
    pub port: u16,
    /// Number of shard executors. Defaults to the number of CPU cores.
    pub shard_count: usize,
    /// Connection limit enforced at admission.
    pub max_clients: usize,
    /// Whole-engine key budget, split evenly across shards.
    pub max_keys: usize,
    /// Victim selection when a shard needs space.
    pub eviction_policy: EvictionPolicy,
    /// Fraction of a shard's capacity reclaimed per eviction pass.
    pub eviction_ratio: f64,
    /// Expiry-table entries sampled per sweep round.
    pub expiry_sample_size: usize,
    /// Expired fraction of a sample that keeps the sweep going.
    pub expiry_threshold: f64,
    /// Delay between expiry sweeps on an idle shard.
    pub expiry_interval: Duration,
    /// How long a worker waits for shard responses.
    pub response_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7379,
            shard_count: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8),
            max_clients: 20_000,
            max_keys: 1_000_000,
            eviction_policy: EvictionPolicy::AllKeysLru,
            eviction_ratio: 0.1,
            expiry_sample_size: 20,
            expiry_threshold: 0.25,
            expiry_interval: Duration::from_millis(100),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Parses command-line arguments, exiting with a message on bad input.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().collect())
    }

    fn parse(args: Vec<String>) -> Self {
        let mut config = Config::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-H" => {
                    config.host = expect_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = parse_or_exit(expect_value(&args, i, "--port"), "--port");
                    i += 2;
                }
                "--shards" => {
                    config.shard_count =
                        parse_or_exit(expect_value(&args, i, "--shards"), "--shards");
                    i += 2;
                }
                "--max-clients" => {
                    config.max_clients =
                        parse_or_exit(expect_value(&args, i, "--max-clients"), "--max-clients");
                    i += 2;
                }
                "--max-keys" => {
                    config.max_keys =
                        parse_or_exit(expect_value(&args, i, "--max-keys"), "--max-keys");
                    i += 2;
                }
                "--eviction-policy" => {
                    config.eviction_policy = parse_or_exit(
                        expect_value(&args, i, "--eviction-policy"),
                        "--eviction-policy",
                    );
                    i += 2;
                }
                "--eviction-ratio" => {
                    config.eviction_ratio = parse_or_exit(
                        expect_value(&args, i, "--eviction-ratio"),
                        "--eviction-ratio",
                    );
                    i += 2;
                }
                "--expiry-sample" => {
                    config.expiry_sample_size =
                        parse_or_exit(expect_value(&args, i, "--expiry-sample"), "--expiry-sample");
                    i += 2;
                }
                "--expiry-threshold" => {
                    config.expiry_threshold = parse_or_exit(
                        expect_value(&args, i, "--expiry-threshold"),
                        "--expiry-threshold",
                    );
                    i += 2;
                }
                "--response-timeout" => {
                    let millis: u64 = parse_or_exit(
                        expect_value(&args, i, "--response-timeout"),
                        "--response-timeout",
                    );
                    config.response_timeout = Duration::from_millis(millis);
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-V" => {
                    println!("riftdb {}", crate::VERSION);
                    process::exit(0);
                }
                unknown => {
                    eprintln!("Unknown argument: {}", unknown);
                    eprintln!("Use --help for usage information");
                    process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            bail!("shard count must be at least 1");
        }
        if self.max_clients == 0 {
            bail!("max clients must be at least 1");
        }
        if self.max_keys < self.shard_count {
            bail!(
                "max keys ({}) must allow at least one key per shard ({} shards)",
                self.max_keys,
                self.shard_count
            );
        }
        if !(0.0..=1.0).contains(&self.eviction_ratio) {
            bail!(
                "eviction ratio must be between 0.0 and 1.0, got {}",
                self.eviction_ratio
            );
        }
        if self.expiry_sample_size == 0 {
            bail!("expiry sample size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.expiry_threshold) {
            bail!(
                "expiry threshold must be between 0.0 and 1.0, got {}",
                self.expiry_threshold
            );
        }
        Ok(())
    }
}

fn expect_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Missing value for {}", flag);
            process::exit(1);
        }
    }
}

fn parse_or_exit<T: FromStr>(raw: &str, flag: &str) -> T
where
    T::Err: std::fmt::Display,
{
    raw.parse().unwrap_or_else(|err| {
        eprintln!("Invalid value for {}: {} ({})", flag, raw, err);
        process::exit(1);
    })
}

fn print_help() {
    println!("riftdb {} - sharded in-memory key-value store", crate::VERSION);
    println!();
    println!("USAGE:");
    println!("    riftdb [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -H, --host <HOST>              Bind address [default: 127.0.0.1]");
    println!("    -p, --port <PORT>              Listen port [default: 7379]");
    println!("        --shards <N>               Shard executor count [default: CPU cores]");
    println!("        --max-clients <N>          Connection limit [default: 20000]");
    println!("        --max-keys <N>             Whole-engine key budget [default: 1000000]");
    println!("        --eviction-policy <NAME>   simple-first | allkeys-random | allkeys-lru");
    println!("        --eviction-ratio <F>       Capacity fraction evicted per pass [default: 0.1]");
    println!("        --expiry-sample <N>        Keys sampled per sweep round [default: 20]");
    println!("        --expiry-threshold <F>     Expired fraction that repeats a sweep [default: 0.25]");
    println!("        --response-timeout <MS>    Worker wait on shard responses, in milliseconds [default: 5000]");
    println!("    -h, --help                     Print help");
    println!("    -V, --version                  Print version");
}
