//! Candidate endpoints

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Bytes per megabyte as used for speed thresholds and display
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// An address with its measured latency and, once probed, download speed
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ip: IpAddr,

    /// Latency measured upstream; input lists are sorted by it
    pub latency: Duration,

    /// Download speed in bytes per second (0 until probed)
    pub speed: f64,
}

impl Candidate {
    pub fn new(ip: IpAddr, latency: Duration) -> Self {
        Self {
            ip,
            latency,
            speed: 0.0,
        }
    }

    /// Download speed in MB/s
    pub fn speed_mb(&self) -> f64 {
        self.speed / BYTES_PER_MB
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2} ms, {:.2} MB/s)",
            self.ip,
            self.latency.as_secs_f64() * 1000.0,
            self.speed_mb()
        )
    }
}

/// Sort fastest first; equal speeds keep their latency order
pub fn sort_by_speed(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.speed.partial_cmp(&a.speed).unwrap_or(Ordering::Equal));
}
