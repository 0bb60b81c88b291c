//! Blocking fragmenting writer

use std::io::{self, Write};
use std::thread;

use crate::{FragmentPolicy, Fragmenter, Step};

/// `std::io::Write` adapter that splits the first bytes of a stream into
/// separate underlying writes, sleeping between them.
///
/// A successful `write` always reports the whole buffer, however many
/// underlying writes it took. If the sink fails after part of the buffer
/// went out, the consumed count is returned and the error surfaces on the
/// next call.
#[derive(Debug)]
pub struct FragmentWriter<W> {
    inner: W,
    fragmenter: Fragmenter,
}

impl<W: Write> FragmentWriter<W> {
    pub fn new(inner: W, policy: FragmentPolicy) -> Self {
        Self::with_fragmenter(inner, Fragmenter::new(policy))
    }

    pub fn with_fragmenter(inner: W, fragmenter: Fragmenter) -> Self {
        Self { inner, fragmenter }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn fragmenter(&self) -> &Fragmenter {
        &self.fragmenter
    }
}

impl<W: Write> Write for FragmentWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(delay) = self.fragmenter.start(buf.len()) {
            thread::sleep(delay);
        }

        let mut offset = 0;
        while offset < buf.len() {
            match self.fragmenter.next_step(buf.len() - offset) {
                Step::Passthrough => {
                    let n = match self.inner.write(&buf[offset..]) {
                        Ok(n) => n,
                        Err(e) => return partial(offset, e),
                    };
                    self.fragmenter.advance(n);
                    offset += n;
                    break;
                }
                Step::Chunk(len) => {
                    let n = match self.inner.write(&buf[offset..offset + len]) {
                        Ok(0) => return partial(offset, io::ErrorKind::WriteZero.into()),
                        Ok(n) => n,
                        Err(e) => return partial(offset, e),
                    };
                    offset += n;
                    if let Some(delay) = self.fragmenter.advance(n) {
                        thread::sleep(delay);
                    }
                }
            }
        }

        Ok(offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn partial(consumed: usize, err: io::Error) -> io::Result<usize> {
    if consumed > 0 { Ok(consumed) } else { Err(err) }
}
