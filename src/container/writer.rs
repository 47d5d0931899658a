use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::header::{
    ContainerSpec, Encoding, WavHeader, DATA_SIZE_OFFSET, HEADER_LEN, RIFF_SIZE_OFFSET,
};
use super::ulaw;
use crate::error::Result;

/// Sizes recorded into the header when a container is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub path: Option<PathBuf>,
    /// Total bytes on disk, header included
    pub file_size: u64,
    /// Payload bytes after the header
    pub data_size: u64,
    /// Samples appended over the writer's lifetime
    pub samples: u64,
}

/// Streaming writer for one container file.
///
/// The header goes out with zeroed size fields; [`ContainerWriter::finalize`]
/// seeks back and patches them from the final write position. Dropping an
/// unfinalized writer patches them on a best-effort basis.
pub struct ContainerWriter<W: Write + Seek = BufWriter<File>> {
    inner: Option<W>,
    spec: ContainerSpec,
    path: Option<PathBuf>,
    scratch: Vec<u8>,
    samples: u64,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create `path` and write a placeholder header. Fails if the file cannot
    /// be created.
    pub fn create(path: impl AsRef<Path>, spec: ContainerSpec) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;

        let mut writer = Self::new(BufWriter::new(file), spec)?;
        writer.path = Some(path.to_path_buf());
        writer.flush()?;

        info!(
            "Opened container {} ({} Hz, {}-bit, {} ch, {:?})",
            path.display(),
            spec.sample_rate,
            spec.bits_per_sample,
            spec.channels,
            spec.encoding
        );

        Ok(writer)
    }
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Write the placeholder header. Fails for a spec the writer cannot
    /// encode (linear other than 16-bit, µ-law other than 8-bit).
    pub fn new(mut inner: W, spec: ContainerSpec) -> Result<Self> {
        let header = WavHeader::placeholder(&spec);
        header.encoding()?;
        inner.write_all(&header.to_bytes())?;

        Ok(Self {
            inner: Some(inner),
            spec,
            path: None,
            scratch: Vec::new(),
            samples: 0,
        })
    }

    /// Append samples in the container's own encoding.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        match self.spec.encoding {
            Encoding::Linear => self.write_linear(samples),
            Encoding::MuLaw => self.write_companded(samples),
        }
    }

    /// Append samples as 16-bit little-endian PCM.
    pub fn write_linear(&mut self, samples: &[i16]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.scratch.clear();
        self.scratch
            .extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        self.write_scratch(samples.len())
    }

    /// Append samples µ-law encoded, one byte per sample.
    pub fn write_companded(&mut self, samples: &[i16]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        ulaw::encode_into(samples, &mut self.scratch);
        self.write_scratch(samples.len())
    }

    fn write_scratch(&mut self, sample_count: usize) -> Result<()> {
        if let Some(inner) = &mut self.inner {
            inner.write_all(&self.scratch)?;
            self.samples += sample_count as u64;
        }
        Ok(())
    }

    /// Push everything written so far through to the underlying file.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(inner) = &mut self.inner {
            inner.flush()?;
        }
        Ok(())
    }

    /// Patch both size fields and release the handle.
    pub fn finalize(self) -> Result<ContainerSummary> {
        self.finish().map(|(_, summary)| summary)
    }

    /// Like [`finalize`](Self::finalize), but hands back the underlying writer.
    pub fn finish(mut self) -> Result<(W, ContainerSummary)> {
        let mut inner = match self.inner.take() {
            Some(inner) => inner,
            None => {
                return Err(anyhow::anyhow!("container writer already finalized").into());
            }
        };

        let (file_size, data_size) = patch_sizes(&mut inner)?;

        info!(
            "Container closed: {} bytes total, {} bytes payload",
            file_size, data_size
        );

        Ok((
            inner,
            ContainerSummary {
                path: self.path.take(),
                file_size,
                data_size,
                samples: self.samples,
            },
        ))
    }
}

impl<W: Write + Seek> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Err(e) = patch_sizes(&mut inner) {
                warn!("Failed to finalize container on drop: {}", e);
            }
        }
    }
}

fn patch_sizes<W: Write + Seek>(inner: &mut W) -> Result<(u64, u64)> {
    let file_size = inner.stream_position()?;
    let data_size = file_size.saturating_sub(HEADER_LEN as u64);
    let riff_size = file_size.saturating_sub(8);

    inner.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    inner.write_all(&clamp_u32(riff_size).to_le_bytes())?;

    inner.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
    inner.write_all(&clamp_u32(data_size).to_le_bytes())?;

    inner.seek(SeekFrom::Start(file_size))?;
    inner.flush()?;

    Ok((file_size, data_size))
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finalize_patches_size_fields() {
        let mut writer =
            ContainerWriter::new(Cursor::new(Vec::new()), ContainerSpec::linear(20_000, 16, 1))
                .unwrap();
        writer.write_linear(&[1, -1, 300, -300]).unwrap();

        let (cursor, summary) = writer.finish().unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(bytes.len(), 52);
        assert_eq!(summary.file_size, 52);
        assert_eq!(summary.data_size, 8);
        assert_eq!(summary.samples, 4);
        assert_eq!(&bytes[4..8], &44u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &8u32.to_le_bytes());
        assert_eq!(&bytes[44..46], &1i16.to_le_bytes());
        assert_eq!(&bytes[46..48], &(-1i16).to_le_bytes());
    }

    #[test]
    fn companded_payload_is_one_byte_per_sample() {
        let mut writer =
            ContainerWriter::new(Cursor::new(Vec::new()), ContainerSpec::mulaw(20_000, 1))
                .unwrap();
        writer.write_samples(&[0, 0, i16::MAX]).unwrap();

        let (cursor, summary) = writer.finish().unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(summary.data_size, 3);
        assert_eq!(&bytes[44..], &[0xFF, 0xFF, 0x80]);
    }

    #[test]
    fn unencodable_specs_are_rejected() {
        for bits in [8, 24] {
            let result =
                ContainerWriter::new(Cursor::new(Vec::new()), ContainerSpec::linear(8000, bits, 1));
            assert!(matches!(
                result,
                Err(crate::error::RecorderError::UnsupportedFormat {
                    format_code: 1,
                    bits_per_sample
                }) if bits_per_sample == bits
            ));
        }
    }

    #[test]
    fn empty_writes_are_noops() {
        let mut writer =
            ContainerWriter::new(Cursor::new(Vec::new()), ContainerSpec::linear(8000, 16, 1))
                .unwrap();
        writer.write_linear(&[]).unwrap();
        writer.write_companded(&[]).unwrap();

        let (_, summary) = writer.finish().unwrap();
        assert_eq!(summary.file_size, HEADER_LEN as u64);
        assert_eq!(summary.data_size, 0);
    }
}
