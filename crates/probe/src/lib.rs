//! fragprobe Probe - download throughput measurement
//!
//! This crate provides:
//! - Candidate endpoint records
//! - Simple EWMA
//! - Time-sliced body sampling
//! - HTTP GET over the fragment-aware dialer (redirects, referer policy)
//! - Throughput probe and the candidate orchestrator

mod candidate;
mod ewma;
mod http;
mod orchestrator;
mod sampler;
mod throughput;

pub use candidate::*;
pub use ewma::*;
pub use http::*;
pub use orchestrator::*;
pub use sampler::*;
pub use throughput::*;
