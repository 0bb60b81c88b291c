//! Client configuration

use anyhow::{Context, Result, bail};
use fragprobe_fragment::FragmentPolicy;
use fragprobe_probe::{
    DEFAULT_MAX_REDIRECTS, DEFAULT_PROBE_COUNT, DEFAULT_PROBE_PORT, DEFAULT_PROBE_URL,
    DEFAULT_USER_AGENT, HttpConfig, OrchestratorConfig,
};
use fragprobe_transport::{DEFAULT_DIAL_TIMEOUT, DialerConfig, Fingerprint};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Download probe configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// TLS handshake configuration
    #[serde(default)]
    pub tls: TlsConfig,

    /// ClientHello fragmentation
    #[serde(default)]
    pub fragment: FragmentConfig,
}

impl ClientConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail once probing started
    pub fn validate(&self) -> Result<()> {
        if self.probe.timeout_secs > MAX_TIMEOUT_SECS {
            bail!(
                "Probe timeout of {}s exceeds the {}s limit",
                self.probe.timeout_secs,
                MAX_TIMEOUT_SECS
            );
        }
        self.fragment_policy()?;
        self.probe_url()?;
        Ok(())
    }

    pub fn probe_url(&self) -> Result<Url> {
        Url::parse(&self.probe.url).with_context(|| format!("Invalid probe URL {:?}", self.probe.url))
    }

    /// The policy to fragment with, if enabled
    pub fn fragment_policy(&self) -> Result<Option<FragmentPolicy>> {
        if !self.fragment.enabled {
            return Ok(None);
        }
        let policy = FragmentPolicy::parse(&self.fragment.policy)
            .with_context(|| format!("Invalid fragment policy {:?}", self.fragment.policy))?;
        Ok(Some(policy))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_token(&self.tls.fingerprint)
    }

    pub fn dialer_config(&self) -> Result<DialerConfig> {
        Ok(DialerConfig {
            source: self.probe.source,
            timeout: self.tls.dial_timeout(),
            keepalive: self.tls.keepalive,
            fragment: self.fragment_policy()?,
        })
    }

    pub fn http_config(&self) -> Result<HttpConfig> {
        Ok(HttpConfig {
            url: self.probe_url()?,
            port: self.probe.port,
            timeout: self.probe.timeout(),
            max_redirects: self.probe.max_redirects,
            user_agent: self.probe.user_agent.clone(),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            count: self.probe.count(),
            min_speed: self.probe.min_speed,
            disabled: self.probe.disabled,
        }
    }
}

/// Download probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// File to download from each candidate
    #[serde(default = "default_url")]
    pub url: String,

    /// Per-candidate timeout (seconds); non-positive means the default
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,

    /// Qualifying candidates to collect; non-positive means the default
    #[serde(default = "default_count")]
    pub count: i64,

    /// Minimum speed (MB/s)
    #[serde(default)]
    pub min_speed: f64,

    /// Port dialed on every candidate
    #[serde(default = "default_port")]
    pub port: u16,

    /// Skip probing entirely
    #[serde(default)]
    pub disabled: bool,

    /// Local address to connect from
    #[serde(default)]
    pub source: Option<SocketAddr>,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_url() -> String {
    DEFAULT_PROBE_URL.to_string()
}

/// Longest per-candidate timeout accepted (one hour)
pub const MAX_TIMEOUT_SECS: i64 = 60 * 60;

fn default_timeout_secs() -> i64 {
    10
}

fn default_count() -> i64 {
    DEFAULT_PROBE_COUNT as i64
}

fn default_port() -> u16 {
    DEFAULT_PROBE_PORT
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs > 0 {
            self.timeout_secs.min(MAX_TIMEOUT_SECS)
        } else {
            default_timeout_secs()
        };
        Duration::from_secs(secs as u64)
    }

    pub fn count(&self) -> usize {
        if self.count > 0 {
            self.count as usize
        } else {
            DEFAULT_PROBE_COUNT
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            count: default_count(),
            min_speed: 0.0,
            port: default_port(),
            disabled: false,
            source: None,
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// TLS handshake configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Client to imitate (chrome, firefox, safari, ios, qq, android, edge,
    /// go, randomized, 360)
    #[serde(default = "default_fingerprint")]
    pub fingerprint: String,

    /// Accept any server certificate
    #[serde(default)]
    pub skip_verify: bool,

    /// Connect and handshake timeout (seconds)
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub keepalive: bool,
}

fn default_fingerprint() -> String {
    Fingerprint::Chrome.token().to_string()
}

fn default_dial_timeout_secs() -> u64 {
    DEFAULT_DIAL_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

impl TlsConfig {
    pub fn dial_timeout(&self) -> Duration {
        if self.dial_timeout_secs == 0 {
            DEFAULT_DIAL_TIMEOUT
        } else {
            Duration::from_secs(self.dial_timeout_secs)
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            fingerprint: default_fingerprint(),
            skip_verify: false,
            dial_timeout_secs: default_dial_timeout_secs(),
            keepalive: default_true(),
        }
    }
}

/// ClientHello fragmentation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FragmentConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `minimumBytes[,chunkSize,delayBeforeStart,delayBetweenChunks,randomChunks,randomDelays,delayRandomness]`
    #[serde(default = "default_policy")]
    pub policy: String,
}

fn default_policy() -> String {
    fragprobe_fragment::TLS_HELLO_MINIMUM_BYTES.to_string()
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: default_policy(),
        }
    }
}
