//! Fragment-aware TLS dialer

use fragprobe_fragment::{FragmentPolicy, FragmentStream, PolicyError};
use rustls::pki_types::ServerName;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace, warn};

use crate::TlsProfile;

/// Default connect and handshake timeout
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum DialError {
    #[error("Socket setup failed: {0}")]
    Socket(io::Error),

    #[error("Bind to {addr} failed: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("Connect to {addr} failed: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("Connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("Invalid fragment policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake { addr: SocketAddr, source: io::Error },

    #[error("TLS handshake with {0} timed out")]
    HandshakeTimeout(SocketAddr),
}

impl DialError {
    /// True for failures after the TCP connection was established
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::HandshakeTimeout(_))
    }
}

/// Raw socket wrapped for (optional) fragmentation
pub type FragmentedTcp = FragmentStream<TcpStream>;

/// TLS session over a possibly fragmenting TCP stream
pub type ProbeStream = TlsStream<FragmentedTcp>;

/// Dialer configuration
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// Local address to bind before connecting
    pub source: Option<SocketAddr>,

    /// Connect timeout, also applied to the TLS handshake
    pub timeout: Duration,

    /// Enable TCP keep-alive
    pub keepalive: bool,

    /// Fragment the ClientHello with this policy
    pub fragment: Option<FragmentPolicy>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            source: None,
            timeout: DEFAULT_DIAL_TIMEOUT,
            keepalive: true,
            fragment: None,
        }
    }
}

/// Opens TCP connections to candidate addresses and runs the TLS handshake
#[derive(Debug, Clone)]
pub struct FragmentDialer {
    config: DialerConfig,
    profile: TlsProfile,
}

impl FragmentDialer {
    pub fn new(config: DialerConfig, profile: TlsProfile) -> Self {
        Self { config, profile }
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn profile(&self) -> &TlsProfile {
        &self.profile
    }

    /// Open a TCP connection to `target`, bound to the configured source
    pub async fn connect_tcp(&self, target: SocketAddr) -> Result<TcpStream, DialError> {
        let socket = if target.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(DialError::Socket)?;

        if self.config.keepalive {
            socket.set_keepalive(true).map_err(DialError::Socket)?;
        }
        if let Some(source) = self.config.source {
            socket.set_reuseaddr(true).map_err(DialError::Socket)?;
            socket.bind(source).map_err(|source_err| DialError::Bind {
                addr: source,
                source: source_err,
            })?;
        }

        trace!("Connecting to {} (source: {:?})", target, self.config.source);
        timeout(self.config.timeout, socket.connect(target))
            .await
            .map_err(|_| DialError::ConnectTimeout(target))?
            .map_err(|source| DialError::Connect {
                addr: target,
                source,
            })
    }

    /// Connect to `target` and complete a TLS handshake presenting `server_name`
    pub async fn dial(&self, target: SocketAddr, server_name: &str) -> Result<ProbeStream, DialError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| DialError::InvalidServerName(server_name.to_string()))?;
        // Policies built in code skip the parser's checks
        if let Some(policy) = &self.config.fragment {
            policy.validate()?;
        }

        let tcp = self.connect_tcp(target).await?;
        let io = match &self.config.fragment {
            Some(policy) => {
                // Keep the kernel from merging our segments back together
                if let Err(e) = tcp.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY on {}: {}", target, e);
                }
                FragmentStream::new(tcp, policy.clone())
            }
            None => FragmentStream::passthrough(tcp),
        };

        debug!(
            "TLS handshake with {} as {} ({} fingerprint, fragmented: {})",
            target,
            server_name,
            self.profile.fingerprint(),
            self.config.fragment.is_some()
        );

        // The stream is dropped (and the socket closed) on failure
        let connector = TlsConnector::from(self.profile.config());
        match timeout(self.config.timeout, connector.connect(name, io)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(DialError::Handshake {
                addr: target,
                source,
            }),
            Err(_) => Err(DialError::HandshakeTimeout(target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fingerprint;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn dialer(config: DialerConfig) -> FragmentDialer {
        let profile = TlsProfile::resolve(Fingerprint::Chrome, false).unwrap();
        FragmentDialer::new(config, profile)
    }

    #[test]
    fn test_default_config() {
        let config = DialerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.keepalive);
        assert!(config.source.is_none());
        assert!(config.fragment.is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_is_dial_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dialer(DialerConfig::default())
            .dial(addr, "example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Connect { .. }), "{err}");
        assert!(!err.is_handshake());
    }

    #[tokio::test]
    async fn test_binds_source_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let source: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = DialerConfig {
            source: Some(source),
            ..Default::default()
        };
        let stream = dialer(config).connect_tcp(addr).await.unwrap();
        let (accepted, peer) = listener.accept().await.unwrap();

        assert_eq!(stream.local_addr().unwrap(), peer);
        assert_eq!(peer.ip(), source.ip());
        drop(accepted);
    }

    #[tokio::test]
    async fn test_handshake_failure_is_distinct() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            // Hang up right after the record header
            buf
        });

        let err = dialer(DialerConfig::default())
            .dial(addr, "example.com")
            .await
            .unwrap_err();
        assert!(err.is_handshake(), "{err}");

        let header = server.await.unwrap();
        // TLS handshake record
        assert_eq!(header[0], 0x16);
        assert_eq!(header[1], 0x03);
    }

    #[tokio::test]
    async fn test_invalid_server_name() {
        let err = dialer(DialerConfig::default())
            .dial("127.0.0.1:443".parse().unwrap(), "not a host name")
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::InvalidServerName(_)));
    }

    #[tokio::test]
    async fn test_hand_built_policy_checked_before_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = DialerConfig {
            fragment: Some(FragmentPolicy {
                chunk_size: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = dialer(config).dial(addr, "example.com").await.unwrap_err();
        assert!(
            matches!(err, DialError::Policy(PolicyError::ChunkSizeTooSmall(1))),
            "{err}"
        );

        // Nothing was dialed
        let accepted = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(accepted.is_err());
    }
}
