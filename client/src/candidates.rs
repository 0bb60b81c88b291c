//! Candidate list loading
//!
//! One candidate per line as `ip[,latency_ms]`; blank lines and `#`
//! comments are skipped.

use fragprobe_probe::Candidate;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CandidateError {
    #[error("Failed to read candidate list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: invalid address {value:?}")]
    InvalidAddress { line: usize, value: String },

    #[error("Line {line}: invalid latency {value:?}")]
    InvalidLatency { line: usize, value: String },
}

/// Read a candidate file
pub async fn load_candidates(path: impl AsRef<Path>) -> Result<Vec<Candidate>, CandidateError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_candidates(&content)
}

/// Parse a candidate list, ordered by ascending latency.
///
/// Candidates without a latency sort first, in file order.
pub fn parse_candidates(content: &str) -> Result<Vec<Candidate>, CandidateError> {
    let mut candidates = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let entry = raw.split('#').next().unwrap_or_default().trim();
        if entry.is_empty() {
            continue;
        }

        let mut fields = entry.split(',').map(str::trim);
        let address = fields.next().unwrap_or_default();
        let ip: IpAddr = address.parse().map_err(|_| CandidateError::InvalidAddress {
            line,
            value: address.to_string(),
        })?;

        let latency = match fields.next() {
            Some(value) => parse_latency(value).ok_or_else(|| CandidateError::InvalidLatency {
                line,
                value: value.to_string(),
            })?,
            None => Duration::ZERO,
        };

        candidates.push(Candidate::new(ip, latency));
    }

    candidates.sort_by_key(|c| c.latency);
    Ok(candidates)
}

fn parse_latency(value: &str) -> Option<Duration> {
    let ms: f64 = value.parse().ok()?;
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_rank() {
        let candidates = parse_candidates(
            "# scanned 2026-10-01\n\
             104.16.1.1,120.5\n\
             \n\
             104.16.1.2, 80 # fastest\n\
             2606:4700::1111,95\n",
        )
        .unwrap();

        let ips: Vec<String> = candidates.iter().map(|c| c.ip.to_string()).collect();
        assert_eq!(ips, vec!["104.16.1.2", "2606:4700::1111", "104.16.1.1"]);
        assert_eq!(candidates[0].latency, Duration::from_millis(80));
        assert_eq!(candidates[2].latency, Duration::from_micros(120_500));
        assert!(candidates.iter().all(|c| c.speed == 0.0));
    }

    #[test]
    fn test_latency_optional() {
        let candidates = parse_candidates("10.0.0.2,5\n10.0.0.1\n10.0.0.3\n").unwrap();
        let ips: Vec<String> = candidates.iter().map(|c| c.ip.to_string()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.3", "10.0.0.2"]);
    }

    #[test]
    fn test_errors_name_the_line() {
        let err = parse_candidates("10.0.0.1\nnot-an-ip\n").unwrap_err();
        assert!(matches!(err, CandidateError::InvalidAddress { line: 2, .. }), "{err}");

        let err = parse_candidates("10.0.0.1,-3\n").unwrap_err();
        assert!(matches!(err, CandidateError::InvalidLatency { line: 1, .. }), "{err}");
    }

    #[test]
    fn test_empty_list() {
        assert!(parse_candidates("# nothing\n\n").unwrap().is_empty());
    }
}
