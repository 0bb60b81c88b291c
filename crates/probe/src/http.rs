//! Minimal HTTP GET over dialer connections
//!
//! Every hop of a redirect chain connects to the same candidate address;
//! only the Host header, SNI and request path follow the redirect.

use async_trait::async_trait;
use bytes::Bytes;
use fragprobe_transport::{DialError, FragmentDialer};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, HOST, LOCATION, REFERER, USER_AGENT};
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};
use url::{Host, Position, Url};

use crate::BodySource;

/// Download target used when none is configured
pub const DEFAULT_PROBE_URL: &str = "https://cf.xiu2.xyz/url";

/// Redirects followed before the last response is accepted as-is
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Desktop Chrome on macOS
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.80 Safari/537.36";

/// Default throughput timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default port dialed on each candidate
pub const DEFAULT_PROBE_PORT: u16 = 443;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Dial failed: {0}")]
    Dial(#[from] DialError),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Unexpected status: {0}")]
    Status(StatusCode),

    #[error("Timed out")]
    Timeout,

    #[error("Timeout out of range: {0:?}")]
    InvalidTimeout(Duration),

    #[error("Stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// Request parameters shared by every probe
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub url: Url,

    /// Port dialed on the candidate, regardless of the URL's port
    pub port: u16,

    /// Bounds the whole exchange and, separately, the body sampling
    pub timeout: Duration,

    pub max_redirects: usize,

    pub user_agent: String,
}

impl HttpConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            port: DEFAULT_PROBE_PORT,
            timeout: DEFAULT_PROBE_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Aborts the spawned connection driver when the response is dropped
#[derive(Debug)]
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Response head with the body still unread
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,

    /// Declared body length, if any
    pub content_length: Option<u64>,

    /// Redirects followed to get here
    pub redirects: usize,

    location: Option<String>,
    body: Incoming,
    connection: ConnectionGuard,
}

impl Fetched {
    /// The body as a sample source whose reads fail once `deadline` passes
    pub fn into_body(self, deadline: Instant) -> DeadlineBody {
        DeadlineBody {
            body: self.body,
            deadline,
            _connection: self.connection,
        }
    }
}

/// Response body bounded by the overall request deadline
#[derive(Debug)]
pub struct DeadlineBody {
    body: Incoming,
    deadline: Instant,
    _connection: ConnectionGuard,
}

#[async_trait]
impl BodySource for DeadlineBody {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match timeout_at(self.deadline, self.body.frame()).await {
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "request deadline exceeded")),
            Ok(None) => Ok(None),
            Ok(Some(Err(e))) => Err(io::Error::other(e)),
            // Trailers carry no payload
            Ok(Some(Ok(frame))) => Ok(Some(frame.into_data().unwrap_or_default())),
        }
    }
}

/// GET `config.url` from `ip`, following redirects.
///
/// Once `max_redirects` redirects have been followed, the next redirect
/// response is returned instead of followed.
pub async fn fetch(
    dialer: &FragmentDialer,
    ip: IpAddr,
    config: &HttpConfig,
) -> Result<Fetched, ProbeError> {
    let target = SocketAddr::new(ip, config.port);
    let mut url = config.url.clone();
    let mut referer: Option<String> = None;
    let mut redirects = 0;

    loop {
        let mut fetched = request(dialer, target, &url, referer.as_deref(), config).await?;
        fetched.redirects = redirects;
        trace!("GET {} via {} -> {}", url, target, fetched.status);

        if !is_redirect(fetched.status) || redirects >= config.max_redirects {
            return Ok(fetched);
        }
        let Some(location) = fetched.location.take() else {
            return Ok(fetched);
        };

        let next = url
            .join(&location)
            .map_err(|e| ProbeError::InvalidUrl(format!("{location}: {e}")))?;
        referer = redirect_referer(&url, &next, &config.url);
        debug!("Redirected from {} to {}", url, next);

        url = next;
        redirects += 1;
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Referer for the request following a redirect from `prev` to `next`.
///
/// None on an https to http downgrade, or when it would expose the probe URL.
pub fn redirect_referer(prev: &Url, next: &Url, probe_url: &Url) -> Option<String> {
    if prev.scheme() == "https" && next.scheme() == "http" {
        return None;
    }

    let mut referer = prev.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);

    if referer.as_str() == probe_url.as_str() {
        return None;
    }
    Some(referer.into())
}

async fn request(
    dialer: &FragmentDialer,
    target: SocketAddr,
    url: &Url,
    referer: Option<&str>,
    config: &HttpConfig,
) -> Result<Fetched, ProbeError> {
    match url.scheme() {
        "https" => {
            let server_name = match url.host() {
                Some(Host::Domain(domain)) => domain.to_string(),
                Some(Host::Ipv4(ip)) => ip.to_string(),
                Some(Host::Ipv6(ip)) => ip.to_string(),
                None => return Err(ProbeError::InvalidUrl(url.to_string())),
            };
            let stream = dialer.dial(target, &server_name).await?;
            let h2 = stream.get_ref().1.alpn_protocol() == Some(b"h2".as_slice());
            exchange(stream, h2, url, referer, config).await
        }
        "http" => {
            let stream = dialer.connect_tcp(target).await?;
            exchange(stream, false, url, referer, config).await
        }
        other => Err(ProbeError::InvalidUrl(format!(
            "unsupported scheme {other:?} in {url}"
        ))),
    }
}

/// One request/response over a fresh connection
async fn exchange<I>(
    io: I,
    h2: bool,
    url: &Url,
    referer: Option<&str>,
    config: &HttpConfig,
) -> Result<Fetched, ProbeError>
where
    I: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let io = TokioIo::new(io);

    let (response, connection) = if h2 {
        let (mut sender, conn) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), io).await?;
        let connection = ConnectionGuard(tokio::spawn(async move {
            if let Err(e) = conn.await {
                trace!("HTTP/2 connection closed: {}", e);
            }
        }));
        let request = build_request(&url[..Position::AfterQuery], None, referer, config)?;
        (sender.send_request(request).await?, connection)
    } else {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
        let connection = ConnectionGuard(tokio::spawn(async move {
            if let Err(e) = conn.await {
                trace!("HTTP/1.1 connection closed: {}", e);
            }
        }));
        let host = &url[Position::BeforeHost..Position::AfterPort];
        let request = build_request(
            &url[Position::BeforePath..Position::AfterQuery],
            Some(host),
            referer,
            config,
        )?;
        (sender.send_request(request).await?, connection)
    };

    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(Fetched {
        status: response.status(),
        content_length,
        redirects: 0,
        location,
        body: response.into_body(),
        connection,
    })
}

fn build_request(
    uri: &str,
    host: Option<&str>,
    referer: Option<&str>,
    config: &HttpConfig,
) -> Result<Request<Empty<Bytes>>, ProbeError> {
    let mut builder = Request::get(uri).header(USER_AGENT, &config.user_agent);
    if let Some(host) = host {
        builder = builder.header(HOST, host);
    }
    if let Some(referer) = referer {
        builder = builder.header(REFERER, referer);
    }
    builder
        .body(Empty::new())
        .map_err(|e| ProbeError::InvalidUrl(format!("{uri}: {e}")))
}
