//! Async fragmenting stream
//!
//! Wraps a duplex stream; reads pass through untouched, writes go through a
//! [`Fragmenter`]. Delays are `tokio` timers held in the stream, so dropping
//! the stream (or a future driving it) cancels a pending delay.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Sleep, sleep};

use crate::{FragmentPolicy, Fragmenter, Step};

/// Stream whose first written bytes are split into timed segments.
///
/// `poll_write` returns early at a chunk boundary when a delay is due; the
/// delay is awaited at the start of the next `poll_write`, so callers using
/// `write_all` (or a TLS layer retrying its buffer) see the same segments and
/// timing as with [`crate::FragmentWriter`].
#[derive(Debug)]
pub struct FragmentStream<S> {
    inner: S,
    fragmenter: Fragmenter,
    delay: Option<Pin<Box<Sleep>>>,
}

impl<S> FragmentStream<S> {
    pub fn new(inner: S, policy: FragmentPolicy) -> Self {
        Self::with_fragmenter(inner, Fragmenter::new(policy))
    }

    /// A stream that forwards every write unchanged
    pub fn passthrough(inner: S) -> Self {
        Self::with_fragmenter(inner, Fragmenter::passthrough())
    }

    pub fn with_fragmenter(inner: S, fragmenter: Fragmenter) -> Self {
        Self {
            inner,
            fragmenter,
            delay: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn fragmenter(&self) -> &Fragmenter {
        &self.fragmenter
    }

    fn arm(&mut self, delay: Duration) {
        self.delay = Some(Box::pin(sleep(delay)));
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for FragmentStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for FragmentStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Some(delay) = this.fragmenter.start(buf.len()) {
            this.arm(delay);
        }
        if let Some(delay) = this.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            this.delay = None;
        }

        let mut offset = 0;
        while offset < buf.len() {
            let step = this.fragmenter.next_step(buf.len() - offset);
            let segment = match step {
                Step::Passthrough => &buf[offset..],
                Step::Chunk(len) => &buf[offset..offset + len],
            };

            let n = match Pin::new(&mut this.inner).poll_write(cx, segment) {
                Poll::Ready(Ok(0)) if !segment.is_empty() => {
                    return Poll::Ready(partial(offset, io::ErrorKind::WriteZero.into()));
                }
                Poll::Ready(Ok(n)) => n,
                Poll::Ready(Err(e)) => return Poll::Ready(partial(offset, e)),
                Poll::Pending if offset > 0 => return Poll::Ready(Ok(offset)),
                Poll::Pending => return Poll::Pending,
            };
            offset += n;

            let delay = this.fragmenter.advance(n);
            if step == Step::Passthrough {
                break;
            }
            if let Some(delay) = delay {
                this.arm(delay);
                break;
            }
        }

        Poll::Ready(Ok(offset))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

fn partial(consumed: usize, err: io::Error) -> io::Result<usize> {
    if consumed > 0 { Ok(consumed) } else { Err(err) }
}
