use base64::Engine;
use serde::{Deserialize, Serialize};

/// One live audio chunk published to NATS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub device: String,
    pub sequence: u64,
    pub pcm: String, // Base64-encoded 16-bit LE PCM
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
}

impl AudioFrameMessage {
    pub fn new(device: &str, sequence: u64, pcm_bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            device: device.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn decode_pcm(&self) -> Result<Vec<i16>, base64::DecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.pcm)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}
