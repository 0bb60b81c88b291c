//! fragprobe Fragment - ClientHello fragmentation
//!
//! This crate provides:
//! - Fragmentation policy and its comma-separated string form
//! - Chunk scheduler (fixed and randomized plans)
//! - Delay jitter
//! - Fragmenting writers (blocking `std::io::Write` and async stream)

mod chunks;
mod fragmenter;
mod policy;
mod stream;
mod timing;
mod writer;

pub use chunks::*;
pub use fragmenter::*;
pub use policy::*;
pub use stream::*;
pub use timing::*;
pub use writer::*;
