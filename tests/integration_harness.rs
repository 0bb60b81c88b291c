//! Integration Test Harness
#![allow(dead_code)]
//!
//! Loopback servers that record what the client sends.

use fragprobe_fragment::FragmentPolicy;
use fragprobe_transport::{DialerConfig, FragmentDialer, Fingerprint, TlsProfile};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One read on the server side of a connection
#[derive(Debug, Clone)]
pub struct ReadEvent {
    pub at: Instant,
    pub data: Vec<u8>,
}

/// Accepts one connection and records every read until `limit` bytes
/// arrived, then hangs up.
pub async fn record_reads(limit: usize) -> (SocketAddr, JoinHandle<Vec<ReadEvent>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut events = Vec::new();
        let mut total = 0;
        let mut buf = vec![0u8; 16 * 1024];
        while total < limit {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            total += n;
            events.push(ReadEvent {
                at: Instant::now(),
                data: buf[..n].to_vec(),
            });
        }
        events
    });

    (addr, handle)
}

/// Canned HTTP/1.1 server keyed by request path
pub struct HttpServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

/// How the server answers one path
#[derive(Debug, Clone)]
pub enum Route {
    /// Status line and headers, then the body, then close
    Respond { head: String, body_len: usize },
    Redirect(String),
}

impl Route {
    pub fn ok(body_len: usize) -> Self {
        // No Content-Length: the body runs to the end of the connection
        Self::Respond {
            head: "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string(),
            body_len,
        }
    }

    pub fn status(code: u16, reason: &str) -> Self {
        Self::Respond {
            head: format!("HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\n\r\n"),
            body_len: 0,
        }
    }
}

impl HttpServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(socket, &routes, &recorded).await;
                });
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Request heads received so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    routes: &HashMap<String, Route>,
    recorded: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 8192];
    let mut len = 0;
    while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf[len..]).await?;
        if n == 0 {
            return Ok(());
        }
        len += n;
    }
    let head = String::from_utf8_lossy(&buf[..len]).into_owned();
    let path = head
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();
    recorded.lock().unwrap().push(head);

    match routes.get(&path) {
        Some(Route::Respond { head, body_len }) => {
            socket.write_all(head.as_bytes()).await?;
            let block = [0x5au8; 8192];
            let mut remaining = *body_len;
            while remaining > 0 {
                let n = remaining.min(block.len());
                socket.write_all(&block[..n]).await?;
                remaining -= n;
            }
        }
        Some(Route::Redirect(location)) => {
            let response =
                format!("HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n");
            socket.write_all(response.as_bytes()).await?;
        }
        None => {
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await?;
        }
    }
    socket.shutdown().await
}

/// Case-insensitive header lookup in a raw request head
pub fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

pub fn dialer(fragment: Option<FragmentPolicy>, timeout: Duration) -> FragmentDialer {
    let profile = TlsProfile::resolve(Fingerprint::Chrome, false).unwrap();
    let config = DialerConfig {
        timeout,
        fragment,
        ..Default::default()
    };
    FragmentDialer::new(config, profile)
}
