//! Time-sliced download sampling

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::io;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

use crate::SimpleEwma;

/// Bytes consumed per loop iteration
pub const READ_INCREMENT: usize = 1024;

/// Number of time slices the timeout is divided into
pub const SAMPLE_SLICES: u32 = 100;

/// Divisor turning the per-slice average into bytes per second, as
/// `timeout_secs / SPEED_NORMALIZATION`. Tied to `SAMPLE_SLICES`.
pub const SPEED_NORMALIZATION: f64 = 120.0;

/// A response body delivered as data chunks
#[async_trait]
pub trait BodySource: Send {
    /// Next chunk of data; `Ok(None)` at end of stream
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

/// Read `body` for at most `timeout` and return the smoothed speed in bytes/s.
///
/// Every time a slice boundary (`timeout / 100`) is crossed, the bytes read
/// since the previous boundary go into an EWMA. Reading stops on completion
/// (`content_length` reached), on timeout, on a stream error, or at end of
/// stream; at end of stream the partial last slice is folded in first,
/// rate-normalized by the fraction of the slice that elapsed.
pub async fn sample_body<B>(body: &mut B, content_length: Option<u64>, timeout: Duration) -> f64
where
    B: BodySource + ?Sized,
{
    if timeout.is_zero() {
        return 0.0;
    }

    let start = Instant::now();
    // Slice boundaries may run a little past the deadline
    let Some(end) = timeout
        .checked_add(timeout / 10)
        .and_then(|limit| start.checked_add(limit))
        .map(|_| start + timeout)
    else {
        debug!("Sampling timeout {:?} is out of range", timeout);
        return 0.0;
    };
    let slice = timeout / SAMPLE_SLICES;

    let mut ewma = SimpleEwma::new();
    let mut slice_index: u32 = 1;
    let mut next_boundary = start + slice * slice_index;
    let mut read: u64 = 0;
    let mut last_read: u64 = 0;
    let mut pending = Bytes::new();

    while content_length != Some(read) {
        let now = Instant::now();
        if now > next_boundary {
            slice_index += 1;
            next_boundary = start + slice * slice_index;
            ewma.add((read - last_read) as f64);
            last_read = read;
        }
        if now > end {
            trace!("Sampling timed out after {} bytes", read);
            break;
        }

        if pending.is_empty() {
            match timeout_at(end, body.next_chunk()).await {
                Ok(Ok(Some(chunk))) => pending = chunk,
                Ok(Ok(None)) => {
                    // Scale the partial last slice up to a full one
                    let slice_start = start + slice * (slice_index - 1);
                    let elapsed = now.saturating_duration_since(slice_start);
                    let fraction = elapsed.as_secs_f64() / slice.as_secs_f64();
                    if fraction > 0.0 {
                        ewma.add((read - last_read) as f64 / fraction);
                    }
                    trace!("Body ended after {} bytes", read);
                    break;
                }
                Ok(Err(e)) => {
                    debug!("Body read failed after {} bytes: {}", read, e);
                    break;
                }
                Err(_) => {
                    trace!("Body stalled after {} bytes", read);
                    break;
                }
            }
        }

        let n = pending.len().min(READ_INCREMENT);
        pending.advance(n);
        read += n as u64;
    }

    ewma.value() / (timeout.as_secs_f64() / SPEED_NORMALIZATION)
}
