//! Sequential probing of ranked candidates

use tracing::{debug, info, warn};

use crate::{BYTES_PER_MB, Candidate, SpeedProbe, sort_by_speed};

/// Default number of candidates to keep
pub const DEFAULT_PROBE_COUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Qualifying candidates to collect before stopping
    pub count: usize,

    /// Minimum speed in MB/s; above zero, every candidate may be probed
    pub min_speed: f64,

    /// Skip probing and return the input unchanged
    pub disabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_PROBE_COUNT,
            min_speed: 0.0,
            disabled: false,
        }
    }
}

/// Probes latency-ranked candidates one at a time until enough qualify
#[derive(Debug)]
pub struct Orchestrator<P> {
    probe: P,
    config: OrchestratorConfig,
}

impl<P: SpeedProbe> Orchestrator<P> {
    pub fn new(probe: P, config: OrchestratorConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Probe `candidates` in order and return the qualifying ones, fastest first.
    ///
    /// If none reach the minimum speed, every probed candidate is returned
    /// instead, so a strict threshold never produces an empty result.
    pub async fn run(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if self.config.disabled {
            debug!("Speed probing disabled, keeping {} candidates", candidates.len());
            return candidates;
        }
        if candidates.is_empty() {
            info!("No candidates to probe");
            return candidates;
        }

        // A zero count still probes one candidate
        let count = self.config.count.max(1);
        let attempts = if candidates.len() < count || self.config.min_speed > 0.0 {
            candidates.len()
        } else {
            count
        };
        let wanted = count.min(attempts);
        let threshold = self.config.min_speed * BYTES_PER_MB;

        info!(
            "Probing download speed (min: {:.2} MB/s, wanted: {}, queue: {})",
            self.config.min_speed, wanted, attempts
        );

        let mut probed = Vec::with_capacity(attempts);
        let mut qualified = Vec::with_capacity(wanted);
        for mut candidate in candidates.into_iter().take(attempts) {
            candidate.speed = self.probe.measure(candidate.ip).await;
            info!("{}", candidate);

            if candidate.speed >= threshold {
                qualified.push(candidate.clone());
            }
            probed.push(candidate);
            if qualified.len() == wanted {
                break;
            }
        }

        let mut results = if qualified.is_empty() {
            warn!(
                "No candidate reached {:.2} MB/s, keeping all {} probed",
                self.config.min_speed,
                probed.len()
            );
            probed
        } else {
            qualified
        };
        sort_by_speed(&mut results);
        results
    }
}
