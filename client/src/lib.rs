//! fragprobe client library

pub mod candidates;
pub mod config;
pub mod report;

use anyhow::Result;
use fragprobe_probe::{Orchestrator, ThroughputProbe};
use fragprobe_transport::{FragmentDialer, TlsProfile};
use tracing::info;

use config::ClientConfig;

/// Assemble dialer, probe and orchestrator from a validated configuration
pub fn build_orchestrator(config: &ClientConfig) -> Result<Orchestrator<ThroughputProbe>> {
    let profile = TlsProfile::resolve(config.fingerprint(), config.tls.skip_verify)?;
    let dialer_config = config.dialer_config()?;

    match &dialer_config.fragment {
        Some(policy) => info!("Fragmenting ClientHello with policy {}", policy),
        None => info!("ClientHello fragmentation disabled"),
    }
    info!("Using {} fingerprint", profile.fingerprint());

    let dialer = FragmentDialer::new(dialer_config, profile);
    let probe = ThroughputProbe::new(dialer, config.http_config()?);
    Ok(Orchestrator::new(probe, config.orchestrator_config()))
}
