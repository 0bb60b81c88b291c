//! Browser fingerprint profiles
//!
//! rustls does not allow a byte-exact ClientHello, so each profile controls
//! what it can: cipher suite order, key exchange group order, protocol
//! versions and ALPN. Profiles are resolved once into a shared
//! `ClientConfig` and reused for every connection.

use rustls::client::WantsClientCert;
use rustls::crypto::ring::{self as ring_provider, cipher_suite, kx_group};
use rustls::crypto::{CryptoProvider, SupportedKxGroup};
use rustls::{ClientConfig, ConfigBuilder, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::SkipServerVerification;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Client implementations the handshake can imitate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Chrome,
    Firefox,
    Safari,
    Ios,
    Qq,
    Android,
    Edge,
    Go,
    Randomized,
    Qihoo360,
}

impl Fingerprint {
    pub const ALL: [Fingerprint; 10] = [
        Self::Chrome,
        Self::Firefox,
        Self::Safari,
        Self::Ios,
        Self::Qq,
        Self::Android,
        Self::Edge,
        Self::Go,
        Self::Randomized,
        Self::Qihoo360,
    ];

    /// Look up a profile by name; unknown names fall back to [`Fingerprint::Go`]
    pub fn from_token(token: &str) -> Self {
        match token {
            "chrome" => Self::Chrome,
            "firefox" => Self::Firefox,
            "safari" => Self::Safari,
            "ios" => Self::Ios,
            "qq" => Self::Qq,
            "android" => Self::Android,
            "edge" => Self::Edge,
            "go" => Self::Go,
            "randomized" => Self::Randomized,
            "360" => Self::Qihoo360,
            other => {
                debug!("Unknown fingerprint {:?}, using go", other);
                Self::Go
            }
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::Ios => "ios",
            Self::Qq => "qq",
            Self::Android => "android",
            Self::Edge => "edge",
            Self::Go => "go",
            Self::Randomized => "randomized",
            Self::Qihoo360 => "360",
        }
    }

    /// Concrete handshake parameters for this profile
    pub fn shape(&self) -> HandshakeShape {
        match self {
            Self::Chrome | Self::Edge | Self::Qq | Self::Qihoo360 => HandshakeShape {
                cipher_suites: vec![
                    cipher_suite::TLS13_AES_128_GCM_SHA256,
                    cipher_suite::TLS13_AES_256_GCM_SHA384,
                    cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
                ],
                kx_groups: vec![kx_group::X25519, kx_group::SECP256R1, kx_group::SECP384R1],
                versions: rustls::ALL_VERSIONS,
                alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            },
            Self::Firefox => HandshakeShape {
                cipher_suites: vec![
                    cipher_suite::TLS13_AES_128_GCM_SHA256,
                    cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS13_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
                ],
                kx_groups: vec![kx_group::X25519, kx_group::SECP256R1, kx_group::SECP384R1],
                versions: rustls::ALL_VERSIONS,
                alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            },
            Self::Safari | Self::Ios => HandshakeShape {
                cipher_suites: vec![
                    cipher_suite::TLS13_AES_128_GCM_SHA256,
                    cipher_suite::TLS13_AES_256_GCM_SHA384,
                    cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
                ],
                kx_groups: vec![kx_group::X25519, kx_group::SECP256R1, kx_group::SECP384R1],
                versions: rustls::ALL_VERSIONS,
                alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            },
            // OkHttp on Android 11 offers HTTP/1.1 first
            Self::Android => HandshakeShape {
                cipher_suites: vec![
                    cipher_suite::TLS13_AES_128_GCM_SHA256,
                    cipher_suite::TLS13_AES_256_GCM_SHA384,
                    cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
                    cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                    cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
                ],
                kx_groups: vec![kx_group::X25519, kx_group::SECP256R1, kx_group::SECP384R1],
                versions: rustls::ALL_VERSIONS,
                alpn: vec![b"http/1.1".to_vec(), b"h2".to_vec()],
            },
            Self::Go => HandshakeShape {
                cipher_suites: ring_provider::DEFAULT_CIPHER_SUITES.to_vec(),
                kx_groups: ring_provider::ALL_KX_GROUPS.to_vec(),
                versions: rustls::DEFAULT_VERSIONS,
                alpn: vec![b"http/1.1".to_vec()],
            },
            Self::Randomized => {
                let mut shape = Self::Chrome.shape();
                fastrand::shuffle(&mut shape.cipher_suites);
                fastrand::shuffle(&mut shape.kx_groups);
                if fastrand::bool() {
                    shape.alpn = vec![b"http/1.1".to_vec()];
                }
                shape
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The parts of a ClientHello a profile fixes
#[derive(Debug, Clone)]
pub struct HandshakeShape {
    pub cipher_suites: Vec<SupportedCipherSuite>,
    pub kx_groups: Vec<&'static dyn SupportedKxGroup>,
    pub versions: &'static [&'static SupportedProtocolVersion],
    pub alpn: Vec<Vec<u8>>,
}

/// A fingerprint resolved into a ready-to-use rustls configuration
#[derive(Debug, Clone)]
pub struct TlsProfile {
    fingerprint: Fingerprint,
    config: Arc<ClientConfig>,
}

impl TlsProfile {
    /// Build the rustls configuration for `fingerprint`.
    ///
    /// With `skip_verify` the server certificate chain and name are not
    /// checked (handshake signatures still are).
    pub fn resolve(fingerprint: Fingerprint, skip_verify: bool) -> Result<Self, FingerprintError> {
        let shape = fingerprint.shape();
        let provider = Arc::new(CryptoProvider {
            cipher_suites: shape.cipher_suites,
            kx_groups: shape.kx_groups,
            ..ring_provider::default_provider()
        });

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(shape.versions)?;
        let builder: ConfigBuilder<ClientConfig, WantsClientCert> = if skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new(
                    provider.signature_verification_algorithms,
                )))
        } else {
            builder.with_root_certificates(RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            })
        };

        let mut config = builder.with_no_client_auth();
        config.alpn_protocols = shape.alpn;

        debug!(
            "Resolved {} fingerprint (verify: {})",
            fingerprint, !skip_verify
        );

        Ok(Self {
            fingerprint,
            config: Arc::new(config),
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_round_trip() {
        for fingerprint in Fingerprint::ALL {
            assert_eq!(Fingerprint::from_token(fingerprint.token()), fingerprint);
        }
    }

    #[test]
    fn test_unknown_token_falls_back_to_go() {
        assert_eq!(Fingerprint::from_token("netscape"), Fingerprint::Go);
        assert_eq!(Fingerprint::from_token("Chrome"), Fingerprint::Go);
        assert_eq!(Fingerprint::from_token(""), Fingerprint::Go);
    }

    #[test]
    fn test_profiles_differ_in_suite_order() {
        let chrome = Fingerprint::Chrome.shape();
        let firefox = Fingerprint::Firefox.shape();
        let safari = Fingerprint::Safari.shape();

        let suites = |shape: &HandshakeShape| {
            shape
                .cipher_suites
                .iter()
                .map(|s| s.suite())
                .collect::<Vec<_>>()
        };
        assert_ne!(suites(&chrome), suites(&firefox));
        assert_ne!(suites(&chrome), suites(&safari));
        assert_eq!(suites(&chrome), suites(&Fingerprint::Edge.shape()));
    }

    #[test]
    fn test_randomized_keeps_suite_set() {
        let mut chrome: Vec<_> = Fingerprint::Chrome
            .shape()
            .cipher_suites
            .iter()
            .map(|s| u16::from(s.suite()))
            .collect();
        let mut random: Vec<_> = Fingerprint::Randomized
            .shape()
            .cipher_suites
            .iter()
            .map(|s| u16::from(s.suite()))
            .collect();
        chrome.sort_unstable();
        random.sort_unstable();
        assert_eq!(chrome, random);
    }

    #[test]
    fn test_every_profile_resolves() {
        for fingerprint in Fingerprint::ALL {
            for skip_verify in [false, true] {
                let profile = TlsProfile::resolve(fingerprint, skip_verify).unwrap();
                assert_eq!(profile.fingerprint(), fingerprint);
                assert!(!profile.config().alpn_protocols.is_empty());
            }
        }
    }
}
