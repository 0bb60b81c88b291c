//! Result table

use fragprobe_probe::Candidate;
use std::fmt::Write;

/// Render probe results, one row per candidate
pub fn render_table(candidates: &[Candidate]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>12} {:>14}", "IP Address", "Latency (ms)", "Speed (MB/s)");
    for candidate in candidates {
        let _ = writeln!(
            out,
            "{:<40} {:>12.2} {:>14.2}",
            candidate.ip.to_string(),
            candidate.latency.as_secs_f64() * 1000.0,
            candidate.speed_mb()
        );
    }
    out
}
