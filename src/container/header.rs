use crate::error::{RecorderError, Result};

/// Size of the canonical RIFF/WAVE header written by this crate.
pub const HEADER_LEN: usize = 44;

/// Offset of the little-endian `RIFF` chunk size (file length - 8).
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Offset of the little-endian `data` chunk size (payload length).
pub const DATA_SIZE_OFFSET: u64 = 40;

const FORMAT_PCM: u16 = 1;
const FORMAT_MULAW: u16 = 7;
const FMT_CHUNK_LEN: u32 = 16;

/// Payload encoding of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Little-endian linear PCM
    Linear,
    /// 8-bit G.711 µ-law
    MuLaw,
}

impl Encoding {
    pub fn format_code(self) -> u16 {
        match self {
            Encoding::Linear => FORMAT_PCM,
            Encoding::MuLaw => FORMAT_MULAW,
        }
    }
}

/// Stream parameters passed when opening a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSpec {
    pub encoding: Encoding,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl ContainerSpec {
    pub fn linear(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self {
            encoding: Encoding::Linear,
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    /// µ-law is always 8 bits per sample.
    pub fn mulaw(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: Encoding::MuLaw,
            sample_rate,
            bits_per_sample: 8,
            channels,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

/// Parsed (or to-be-written) 44-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Total file length minus 8
    pub riff_size: u32,
    /// Payload length in bytes
    pub data_size: u32,
}

impl WavHeader {
    /// Header with zeroed size fields, as written when a container is opened.
    pub fn placeholder(spec: &ContainerSpec) -> Self {
        Self {
            format_code: spec.encoding.format_code(),
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            byte_rate: spec.byte_rate(),
            block_align: spec.block_align(),
            bits_per_sample: spec.bits_per_sample,
            riff_size: 0,
            data_size: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&self.format_code.to_le_bytes());
        out[22..24].copy_from_slice(&self.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RecorderError::InvalidContainer(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(RecorderError::InvalidContainer(
                "missing RIFF/WAVE tags".to_string(),
            ));
        }

        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        Ok(Self {
            format_code: u16_at(20),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            riff_size: u32_at(4),
            data_size: u32_at(40),
        })
    }

    /// Payload encoding, if this is one of the two supported flavours.
    pub fn encoding(&self) -> Result<Encoding> {
        match (self.format_code, self.bits_per_sample) {
            (FORMAT_PCM, 16) => Ok(Encoding::Linear),
            (FORMAT_MULAW, 8) => Ok(Encoding::MuLaw),
            (format_code, bits_per_sample) => Err(RecorderError::UnsupportedFormat {
                format_code,
                bits_per_sample,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_layout_is_byte_exact() {
        let header = WavHeader::placeholder(&ContainerSpec::linear(20_000, 16, 1));
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(&bytes[16..20], &16u32.to_le_bytes());
        assert_eq!(&bytes[20..22], &1u16.to_le_bytes());
        assert_eq!(&bytes[22..24], &1u16.to_le_bytes());
        assert_eq!(&bytes[24..28], &20_000u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &40_000u32.to_le_bytes());
        assert_eq!(&bytes[32..34], &2u16.to_le_bytes());
        assert_eq!(&bytes[34..36], &16u16.to_le_bytes());
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(&bytes[40..44], &[0, 0, 0, 0]);
    }

    #[test]
    fn mulaw_header_uses_format_seven() {
        let header = WavHeader::placeholder(&ContainerSpec::mulaw(20_000, 1));
        assert_eq!(header.format_code, 7);
        assert_eq!(header.bits_per_sample, 8);
        assert_eq!(header.block_align, 1);
        assert_eq!(header.byte_rate, 20_000);
    }

    #[test]
    fn parse_recovers_fields() {
        let mut header = WavHeader::placeholder(&ContainerSpec::linear(44_100, 16, 2));
        header.riff_size = 1036;
        header.data_size = 1000;

        let parsed = WavHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.encoding().unwrap(), Encoding::Linear);
    }

    #[test]
    fn parse_rejects_short_and_untagged_input() {
        assert!(WavHeader::parse(&[0u8; 20]).is_err());
        let mut bytes = WavHeader::placeholder(&ContainerSpec::mulaw(8000, 1)).to_bytes();
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(
            WavHeader::parse(&bytes),
            Err(RecorderError::InvalidContainer(_))
        ));
    }

    #[test]
    fn unsupported_format_is_reported() {
        let mut header = WavHeader::placeholder(&ContainerSpec::linear(8000, 24, 1));
        header.format_code = 1;
        assert!(matches!(
            header.encoding(),
            Err(RecorderError::UnsupportedFormat {
                format_code: 1,
                bits_per_sample: 24
            })
        ));
    }
}
