//! fragprobe Transport - fragment-aware TLS dialing
//!
//! This crate provides:
//! - Browser fingerprint profiles mapped to rustls handshake shapes
//! - TCP dialer with source binding, keep-alive and connect timeout
//! - TLS handshake over an optionally fragmenting stream

mod dialer;
mod fingerprint;
mod verify;

pub use dialer::*;
pub use fingerprint::*;
pub use verify::*;
