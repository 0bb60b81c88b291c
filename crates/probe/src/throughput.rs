//! Per-candidate download speed measurement

use async_trait::async_trait;
use fragprobe_transport::FragmentDialer;
use hyper::StatusCode;
use std::net::IpAddr;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::{HttpConfig, ProbeError, fetch, sample_body};

/// Measures the download speed of one candidate address
#[async_trait]
pub trait SpeedProbe: Send + Sync {
    /// Speed in bytes/s; zero when the candidate could not be measured
    async fn measure(&self, ip: IpAddr) -> f64;
}

/// Downloads the configured URL from a candidate and samples its speed
#[derive(Debug, Clone)]
pub struct ThroughputProbe {
    dialer: FragmentDialer,
    config: HttpConfig,
}

impl ThroughputProbe {
    pub fn new(dialer: FragmentDialer, config: HttpConfig) -> Self {
        Self { dialer, config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn dialer(&self) -> &FragmentDialer {
        &self.dialer
    }

    /// Like [`SpeedProbe::measure`], but reports why a candidate failed.
    ///
    /// Headers must arrive within the timeout; the body is then sampled for
    /// up to another timeout, while its reads still fail once the first
    /// deadline has passed.
    pub async fn try_measure(&self, ip: IpAddr) -> Result<f64, ProbeError> {
        let deadline = Instant::now()
            .checked_add(self.config.timeout)
            .ok_or(ProbeError::InvalidTimeout(self.config.timeout))?;
        let fetched = timeout_at(deadline, fetch(&self.dialer, ip, &self.config))
            .await
            .map_err(|_| ProbeError::Timeout)??;

        if fetched.status != StatusCode::OK {
            if fetched.status.is_redirection() && fetched.redirects >= self.config.max_redirects {
                return Err(ProbeError::TooManyRedirects(fetched.redirects));
            }
            return Err(ProbeError::Status(fetched.status));
        }

        let content_length = fetched.content_length;
        let mut body = fetched.into_body(deadline);
        Ok(sample_body(&mut body, content_length, self.config.timeout).await)
    }
}

#[async_trait]
impl SpeedProbe for ThroughputProbe {
    async fn measure(&self, ip: IpAddr) -> f64 {
        match self.try_measure(ip).await {
            Ok(speed) => {
                debug!("{} measured at {:.0} B/s", ip, speed);
                speed
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", ip, e);
                0.0
            }
        }
    }
}
