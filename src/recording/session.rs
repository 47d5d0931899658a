//! Recording session lifecycle.
//!
//! At most one session is open at a time. An open session owns its container
//! writer, so "recording without a file" cannot be expressed. Samples go
//! through a fixed write buffer; each part file holds at most
//! `split_samples` samples before the session rotates to `<base>_pN.wav`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::naming::{self, WallClock};
use super::storage::SpaceProbe;
use super::write_buffer::WriteBuffer;
use crate::container::{ContainerSpec, ContainerSummary, ContainerWriter, Encoding};
use crate::error::{RecorderError, Result};

/// Who started a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Manual,
    #[serde(rename = "auto")]
    Automatic,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Requested,
    SpaceLow,
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub recordings_dir: PathBuf,
    pub sample_rate: u32,
    pub write_buffer_samples: usize,
    /// Samples per part file before rotating
    pub split_samples: u64,
    /// Free bytes required to open a session
    pub min_free_start_bytes: u64,
    /// Free bytes below which an open session is force-stopped
    pub min_free_continue_bytes: u64,
    /// `tick` calls between free-space checks
    pub space_check_interval_chunks: u32,
}

impl SessionConfig {
    pub fn new(recordings_dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            sample_rate,
            write_buffer_samples: 8000,
            split_samples: u64::from(sample_rate) * 300,
            min_free_start_bytes: 1024 * 1024,
            min_free_continue_bytes: 512 * 1024,
            space_check_interval_chunks: 250,
        }
    }
}

/// Describes the session that was just opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub base_name: String,
    pub file_name: String,
    pub provenance: Provenance,
    pub encoding: Encoding,
    pub started_at: Option<DateTime<Local>>,
}

/// Everything written by a finished session.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub base_name: String,
    pub provenance: Provenance,
    pub reason: CloseReason,
    pub parts: Vec<ContainerSummary>,
}

impl ClosedSession {
    pub fn total_samples(&self) -> u64 {
        self.parts.iter().map(|p| p.samples).sum()
    }
}

struct OpenSession {
    writer: ContainerWriter,
    info: SessionInfo,
    /// 1-based index of the current part
    part: u32,
    /// Samples accepted into the current part, buffered ones included
    part_samples: u64,
    completed: Vec<ContainerSummary>,
}

enum SessionState {
    Closed,
    Open(Box<OpenSession>),
}

pub struct SessionManager {
    config: SessionConfig,
    state: SessionState,
    buffer: WriteBuffer,
    probe: Box<dyn SpaceProbe>,
    clock: Box<dyn WallClock>,
    chunks_since_check: u32,
    last_free_bytes: Option<u64>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        probe: Box<dyn SpaceProbe>,
        clock: Box<dyn WallClock>,
    ) -> Self {
        let buffer = WriteBuffer::new(config.write_buffer_samples);
        Self {
            config,
            state: SessionState::Closed,
            buffer,
            probe,
            clock,
            chunks_since_check: 0,
            last_free_bytes: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        match &self.state {
            SessionState::Open(session) => Some(&session.info),
            SessionState::Closed => None,
        }
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.info().map(|info| info.provenance)
    }

    /// Free bytes seen by the most recent space query.
    pub fn last_free_bytes(&self) -> Option<u64> {
        self.last_free_bytes
    }

    /// Query free space now and remember the answer.
    pub fn refresh_free_bytes(&mut self) -> Result<u64> {
        let free = self.probe.free_bytes()?;
        self.last_free_bytes = Some(free);
        Ok(free)
    }

    /// Open a new session. Refused if one is already open or free space is
    /// under the start watermark.
    pub fn request_start(
        &mut self,
        provenance: Provenance,
        encoding: Encoding,
    ) -> Result<SessionInfo> {
        if self.is_open() {
            return Err(RecorderError::SessionAlreadyOpen);
        }

        let free = self.refresh_free_bytes()?;
        if free < self.config.min_free_start_bytes {
            warn!(
                "Recording refused: {} bytes free, need {}",
                free, self.config.min_free_start_bytes
            );
            return Err(RecorderError::StorageFull {
                free_bytes: free,
                required_bytes: self.config.min_free_start_bytes,
            });
        }

        fs::create_dir_all(&self.config.recordings_dir)?;

        let started_at = self.clock.now();
        let base_name = naming::choose_base_name(&self.config.recordings_dir, self.clock.as_ref())?;
        let file_name = naming::part_file_name(&base_name, 1);
        let writer = self.open_part(&file_name, encoding)?;

        let info = SessionInfo {
            base_name,
            file_name,
            provenance,
            encoding,
            started_at,
        };
        info!(
            "Recording started: {} ({:?}, {:?})",
            info.file_name, provenance, encoding
        );

        self.buffer.clear();
        self.chunks_since_check = 0;
        self.state = SessionState::Open(Box::new(OpenSession {
            writer,
            info: info.clone(),
            part: 1,
            part_samples: 0,
            completed: Vec::new(),
        }));

        Ok(info)
    }

    /// Flush and finalize the open session.
    pub fn request_stop(&mut self) -> Result<ClosedSession> {
        self.close(CloseReason::Requested)
    }

    /// Append samples to the open session, rotating to a new part file
    /// whenever the current one reaches the split limit.
    pub fn append(&mut self, mut samples: &[i16]) -> Result<()> {
        let split = self.config.split_samples.max(1);
        let session = match &mut self.state {
            SessionState::Open(session) => session,
            SessionState::Closed => return Err(RecorderError::NoActiveSession),
        };

        while !samples.is_empty() {
            if session.part_samples >= split {
                flush(&mut self.buffer, &mut session.writer)?;
                rotate(session, &self.config.recordings_dir, self.config.sample_rate)?;
            }

            let room = usize::try_from(split - session.part_samples).unwrap_or(usize::MAX);
            let (now, later) = samples.split_at(samples.len().min(room));

            let mut pending = now;
            while !pending.is_empty() {
                let taken = self.buffer.push(pending);
                pending = &pending[taken..];
                if self.buffer.is_full() {
                    flush(&mut self.buffer, &mut session.writer)?;
                }
            }

            session.part_samples += now.len() as u64;
            samples = later;
        }

        Ok(())
    }

    /// Count one processed chunk. Every `space_check_interval_chunks` calls,
    /// re-query free space and force-stop an open session that has dropped
    /// below the continue watermark.
    pub fn tick(&mut self) -> Result<Option<ClosedSession>> {
        self.chunks_since_check += 1;
        if self.chunks_since_check < self.config.space_check_interval_chunks {
            return Ok(None);
        }
        self.chunks_since_check = 0;

        let free = self.refresh_free_bytes()?;
        if self.is_open() && free < self.config.min_free_continue_bytes {
            warn!(
                "Storage low ({} bytes free, floor {}); stopping recording",
                free, self.config.min_free_continue_bytes
            );
            return self.close(CloseReason::SpaceLow).map(Some);
        }
        Ok(None)
    }

    /// Drop the open session after an I/O failure. Still tries to flush and
    /// patch the header of the current part.
    pub fn abandon(&mut self) -> Option<ClosedSession> {
        let session = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(session) => session,
            SessionState::Closed => return None,
        };
        let OpenSession {
            mut writer,
            info,
            mut completed,
            ..
        } = *session;

        if let Err(e) = flush(&mut self.buffer, &mut writer) {
            warn!("Flush of abandoned recording failed: {}", e);
        }
        self.buffer.clear();
        match writer.finalize() {
            Ok(summary) => completed.push(summary),
            Err(e) => warn!("Finalize of abandoned recording failed: {}", e),
        }
        error!("Recording abandoned: {}", info.file_name);

        Some(ClosedSession {
            base_name: info.base_name,
            provenance: info.provenance,
            reason: CloseReason::Abandoned,
            parts: completed,
        })
    }

    fn close(&mut self, reason: CloseReason) -> Result<ClosedSession> {
        let session = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(session) => session,
            SessionState::Closed => return Err(RecorderError::NoActiveSession),
        };
        let OpenSession {
            mut writer,
            info,
            mut completed,
            ..
        } = *session;

        let flushed = flush(&mut self.buffer, &mut writer);
        self.buffer.clear();
        // finalize even if the flush failed; the writer's drop would otherwise
        // patch the header silently
        let summary = writer.finalize();
        flushed?;
        completed.push(summary?);

        let closed = ClosedSession {
            base_name: info.base_name,
            provenance: info.provenance,
            reason,
            parts: completed,
        };
        info!(
            "Recording stopped: {} ({} part(s), {} samples, {:?})",
            info.file_name,
            closed.parts.len(),
            closed.total_samples(),
            reason
        );
        Ok(closed)
    }

    fn open_part(&self, file_name: &str, encoding: Encoding) -> Result<ContainerWriter> {
        open_part(&self.config.recordings_dir, file_name, self.config.sample_rate, encoding)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close(CloseReason::Requested) {
                warn!("Failed to close recording on shutdown: {}", e);
            }
        }
    }
}

fn flush(buffer: &mut WriteBuffer, writer: &mut ContainerWriter) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    writer.write_samples(buffer.as_slice())?;
    // each flush must reach the file, whatever the payload size
    writer.flush()?;
    buffer.clear();
    Ok(())
}

fn open_part(
    dir: &Path,
    file_name: &str,
    sample_rate: u32,
    encoding: Encoding,
) -> Result<ContainerWriter> {
    let spec = match encoding {
        Encoding::Linear => ContainerSpec::linear(sample_rate, 16, 1),
        Encoding::MuLaw => ContainerSpec::mulaw(sample_rate, 1),
    };
    ContainerWriter::create(dir.join(file_name), spec)
}

/// Finalize the current part and open the next one under the same base name.
fn rotate(session: &mut OpenSession, dir: &Path, sample_rate: u32) -> Result<()> {
    let next_part = session.part + 1;
    let file_name = naming::part_file_name(&session.info.base_name, next_part);
    let next = open_part(dir, &file_name, sample_rate, session.info.encoding)?;

    let finished = std::mem::replace(&mut session.writer, next);
    let summary = finished.finalize()?;
    info!(
        "Split {} after {} samples; continuing in {}",
        session.info.file_name, summary.samples, file_name
    );

    session.completed.push(summary);
    session.part = next_part;
    session.part_samples = 0;
    session.info.file_name = file_name;
    Ok(())
}
