//! Fragmentation policy and its string form
//!
//! A policy string is a comma-separated list of up to seven fields:
//!
//! ```text
//! minimumBytes,chunkSizeOrCount,delayBeforeStart,delayBetweenChunks,randomChunks,randomDelays,delayRandomness
//! ```
//!
//! Only `minimumBytes` is required. Missing trailing fields keep their
//! defaults; any field that is present but malformed rejects the whole string.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Bytes needed to cover the start of a TLS ClientHello record
pub const TLS_HELLO_MINIMUM_BYTES: usize = 67;

/// Default chunk size (or chunk count in randomized mode)
pub const DEFAULT_CHUNK_SIZE: usize = 47;

/// Default delay before the first chunk and between chunks
pub const DEFAULT_FRAGMENT_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid minimum bytes: {0}")]
    InvalidMinimumBytes(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid before start delay: {0}")]
    InvalidDelayBeforeStart(String),

    #[error("Invalid between chunks delay: {0}")]
    InvalidDelayBetweenChunks(String),

    #[error("Invalid random chunks state: {0}")]
    InvalidRandomChunks(String),

    #[error("Invalid random delays state: {0}")]
    InvalidRandomDelays(String),

    #[error("Invalid delay randomness range: {0}")]
    InvalidDelayRandomness(String),

    #[error("Chunk size/count should be larger than 1, got {0}")]
    ChunkSizeTooSmall(i64),
}

/// How the leading bytes of a stream are split into segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPolicy {
    /// Only the first `minimum_bytes` of the stream are fragmented
    pub minimum_bytes: usize,

    /// Chunk size, or chunk count when `random_chunks` is set
    pub chunk_size: usize,

    /// Sleep before the first chunk
    pub delay_before_start: Duration,

    /// Sleep between consecutive chunks
    pub delay_between_chunks: Duration,

    /// Draw chunk sizes at random (then `chunk_size` is a count)
    pub random_chunks: bool,

    /// Jitter every delay by up to `delay_randomness` in both directions
    pub random_delays: bool,

    /// Jitter bound for `random_delays`
    pub delay_randomness: Duration,
}

impl Default for FragmentPolicy {
    fn default() -> Self {
        Self {
            minimum_bytes: TLS_HELLO_MINIMUM_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay_before_start: DEFAULT_FRAGMENT_DELAY,
            delay_between_chunks: DEFAULT_FRAGMENT_DELAY,
            random_chunks: false,
            random_delays: false,
            delay_randomness: Duration::ZERO,
        }
    }
}

impl FragmentPolicy {
    /// Parse a comma-separated policy string
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let mut policy = Self::default();
        let mut parts = s.split(',').map(str::trim);

        // The first field is always present, even for an empty string
        let min = parts.next().unwrap_or_default();
        policy.minimum_bytes = min
            .parse()
            .map_err(|_| PolicyError::InvalidMinimumBytes(min.to_string()))?;

        let mut chunk_size = policy.chunk_size as i64;
        if let Some(p) = parts.next() {
            chunk_size = p
                .parse()
                .map_err(|_| PolicyError::InvalidChunkSize(p.to_string()))?;
        }
        if let Some(p) = parts.next() {
            policy.delay_before_start = parse_duration(p)
                .ok_or_else(|| PolicyError::InvalidDelayBeforeStart(p.to_string()))?;
        }
        if let Some(p) = parts.next() {
            policy.delay_between_chunks = parse_duration(p)
                .ok_or_else(|| PolicyError::InvalidDelayBetweenChunks(p.to_string()))?;
        }
        if let Some(p) = parts.next() {
            policy.random_chunks =
                parse_bool(p).ok_or_else(|| PolicyError::InvalidRandomChunks(p.to_string()))?;
        }
        if let Some(p) = parts.next() {
            policy.random_delays =
                parse_bool(p).ok_or_else(|| PolicyError::InvalidRandomDelays(p.to_string()))?;
        }
        if let Some(p) = parts.next() {
            policy.delay_randomness = parse_duration(p)
                .ok_or_else(|| PolicyError::InvalidDelayRandomness(p.to_string()))?;
        }

        if chunk_size <= 1 {
            return Err(PolicyError::ChunkSizeTooSmall(chunk_size));
        }
        policy.chunk_size = chunk_size as usize;

        Ok(policy)
    }

    /// Check invariants of a policy built by hand
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.chunk_size <= 1 {
            return Err(PolicyError::ChunkSizeTooSmall(self.chunk_size as i64));
        }
        Ok(())
    }
}

impl FromStr for FragmentPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FragmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}us,{}us,{},{},{}us",
            self.minimum_bytes,
            self.chunk_size,
            self.delay_before_start.as_micros(),
            self.delay_between_chunks.as_micros(),
            self.random_chunks,
            self.random_delays,
            self.delay_randomness.as_micros(),
        )
    }
}

/// Parse a duration such as `100ms`, `1.5s`, `1m30s` or `0`
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (num, tail) = rest.split_at(num_end);
        if !num.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: f64 = num.parse().ok()?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };

        nanos += value * scale;
        rest = tail;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos.round() as u64))
}

/// Parse a boolean the way policy strings spell them
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
