use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{DEFAULT_CHUNK_SAMPLES, DEFAULT_SAMPLE_RATE};
use crate::pipeline::{PipelineConfig, RecorderSettings};
use crate::recording::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub recorder: RecorderConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "sentinel-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub wait_timeout_ms: u64,
    /// WAV file played back as the analog input on a host
    pub source_path: Option<PathBuf>,
    /// Restart the source file when it ends
    pub source_loop: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            wait_timeout_ms: 100,
            source_path: None,
            source_loop: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub recordings_path: PathBuf,
    /// Size of the recordings volume; free space is this minus what the
    /// recordings directory already holds
    pub capacity_bytes: u64,
    pub min_free_start_bytes: u64,
    pub min_free_continue_bytes: u64,
    pub space_check_interval_chunks: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recordings_path: PathBuf::from("recordings"),
            capacity_bytes: 4 * 1024 * 1024 * 1024,
            min_free_start_bytes: 1024 * 1024,
            min_free_continue_bytes: 512 * 1024,
            space_check_interval_chunks: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub auto_enabled: bool,
    pub auto_threshold: u16,
    pub ulaw: bool,
    pub highpass_hz: u32,
    pub lowpass_hz: u32,
    pub write_buffer_samples: usize,
    pub split_secs: u64,
    pub preroll_secs: f32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            auto_enabled: false,
            auto_threshold: 2000,
            ulaw: false,
            highpass_hz: 0,
            lowpass_hz: 0,
            write_buffer_samples: 8000,
            split_secs: 300,
            preroll_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Live forwarding is off unless a server is configured
    pub url: Option<String>,
    pub subject: String,
    pub device: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: None,
            subject: "audio.live".to_string(),
            device: "sentinel".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate understands, extension
    /// optional), then apply `SENTINEL__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            auto_enabled: self.recorder.auto_enabled,
            auto_threshold: self.recorder.auto_threshold,
            ulaw: self.recorder.ulaw,
            highpass_hz: self.recorder.highpass_hz,
            lowpass_hz: self.recorder.lowpass_hz,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let rate = u64::from(self.audio.sample_rate);
        SessionConfig {
            recordings_dir: self.storage.recordings_path.clone(),
            sample_rate: self.audio.sample_rate,
            write_buffer_samples: self.recorder.write_buffer_samples,
            split_samples: rate * self.recorder.split_secs,
            min_free_start_bytes: self.storage.min_free_start_bytes,
            min_free_continue_bytes: self.storage.min_free_continue_bytes,
            space_check_interval_chunks: self.storage.space_check_interval_chunks,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::new(self.audio.sample_rate, self.audio.chunk_samples);
        pipeline.preroll_samples =
            (self.audio.sample_rate as f32 * self.recorder.preroll_secs.max(0.0)) as usize;
        pipeline.wait_timeout = Duration::from_millis(self.audio.wait_timeout_ms);
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_sections_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recorder.toml");
        fs::write(
            &path,
            r#"
[recorder]
auto_enabled = true
auto_threshold = 1500

[storage]
recordings_path = "/data/rec"
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert!(cfg.recorder.auto_enabled);
        assert_eq!(cfg.recorder.auto_threshold, 1500);
        assert_eq!(cfg.recorder.write_buffer_samples, 8000);
        assert_eq!(cfg.audio.sample_rate, 20_000);
        assert_eq!(cfg.storage.recordings_path, PathBuf::from("/data/rec"));
        assert_eq!(cfg.storage.min_free_start_bytes, 1024 * 1024);
        assert_eq!(cfg.service.http.port, 8080);
        assert!(cfg.nats.url.is_none());
    }

    #[test]
    fn derived_component_configs() {
        let cfg = Config::default();

        let session = cfg.session_config();
        assert_eq!(session.split_samples, 20_000 * 300);
        assert_eq!(session.min_free_continue_bytes, 512 * 1024);

        let pipeline = cfg.pipeline_config();
        assert_eq!(pipeline.preroll_samples, 20_000);
        assert_eq!(pipeline.chunk_samples, 400);
        assert_eq!(pipeline.wait_timeout, Duration::from_millis(100));

        let settings = cfg.recorder_settings();
        assert!(!settings.auto_enabled);
        assert_eq!(settings.auto_threshold, 2000);
    }
}
