use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, warn};

use super::header::{Encoding, WavHeader, HEADER_LEN};
use super::ulaw;
use crate::error::{RecorderError, Result};

/// A container read back from disk, payload decoded to linear samples.
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    pub header: WavHeader,
    pub encoding: Encoding,
    pub samples: Vec<i16>,
}

/// Read and validate only the 44-byte header.
pub fn read_header(path: impl AsRef<Path>) -> Result<WavHeader> {
    let mut file = File::open(path.as_ref())?;
    let mut bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut bytes)
        .map_err(|_| RecorderError::InvalidContainer("file too small for header".to_string()))?;
    WavHeader::parse(&bytes)
}

/// Read a whole container and decode its payload.
///
/// A zero payload-size field means the writer never finalized the file; the
/// payload then extends to the end of the file.
pub fn read_container(path: impl AsRef<Path>) -> Result<DecodedContainer> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut header_bytes = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|_| RecorderError::InvalidContainer("file too small for header".to_string()))?;
    let header = WavHeader::parse(&header_bytes)?;
    let encoding = header.encoding()?;

    let on_disk = file_len.saturating_sub(HEADER_LEN as u64);
    let data_size = if header.data_size == 0 && on_disk > 0 {
        warn!(
            "{}: payload size not finalized, using {} bytes from file length",
            path.display(),
            on_disk
        );
        on_disk
    } else {
        u64::from(header.data_size).min(on_disk)
    };

    let mut payload = Vec::with_capacity(data_size as usize);
    reader.take(data_size).read_to_end(&mut payload)?;

    let samples: Vec<i16> = match encoding {
        Encoding::Linear => payload
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect(),
        Encoding::MuLaw => payload.iter().map(|&b| ulaw::decode(b)).collect(),
    };

    debug!(
        "Read container {}: {:?}, {} samples",
        path.display(),
        encoding,
        samples.len()
    );

    Ok(DecodedContainer {
        header,
        encoding,
        samples,
    })
}
