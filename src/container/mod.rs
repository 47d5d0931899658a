//! RIFF/WAVE container codec.
//!
//! Recordings are written as a fixed 44-byte header followed by raw payload.
//! The two size fields are written as zero placeholders at open and patched
//! when the writer is finalized, so a file that was never closed can still be
//! recovered by the reader (it falls back to `file length - 44`).
//!
//! Two payload flavours are supported:
//! - linear PCM, 16-bit little-endian (format code 1)
//! - G.711 µ-law, 8-bit (format code 7)

pub mod header;
pub mod reader;
pub mod ulaw;
pub mod writer;

pub use header::{ContainerSpec, Encoding, WavHeader, HEADER_LEN};
pub use reader::{read_container, read_header, DecodedContainer};
pub use writer::{ContainerSummary, ContainerWriter};
