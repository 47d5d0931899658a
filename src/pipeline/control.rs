//! Command and status surface shared between the pipeline worker and
//! request handlers.
//!
//! Commands go through one small lock and are picked up by the worker on its
//! next chunk. The per-chunk meters are atomics that can be read without the
//! lock; session and applied-filter status ride in the same lock as the
//! commands. A momentarily stale read is fine for reporting.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{ChunkStats, FilterSettings};
use crate::recording::{Provenance, SessionInfo};

const FREE_BYTES_UNKNOWN: u64 = u64::MAX;

/// Tunables observed by the worker once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderSettings {
    pub auto_enabled: bool,
    pub auto_threshold: u16,
    pub ulaw: bool,
    /// 0 disables the stage
    pub highpass_hz: u32,
    /// 0 disables the stage
    pub lowpass_hz: u32,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            auto_enabled: false,
            auto_threshold: 2000,
            ulaw: false,
            highpass_hz: 0,
            lowpass_hz: 0,
        }
    }
}

/// A pending manual record command. Only the latest one survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRequest {
    Start,
    Stop,
}

struct Shared {
    pending: Option<RecordRequest>,
    settings: RecorderSettings,
    session: SessionStatus,
    /// Corners the worker's filter actually runs with; `None` until the
    /// worker has published them.
    applied_filter: Option<FilterSettings>,
}

#[derive(Default)]
struct SessionStatus {
    file_name: Option<String>,
    provenance: Option<Provenance>,
    started_at: Option<DateTime<Local>>,
}

/// Read-only status as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub recording: bool,
    pub filename: Option<String>,
    pub rec_source: Option<Provenance>,
    pub rec_started_at: Option<DateTime<Local>>,
    pub current_rms: u16,
    pub current_zcr: f32,
    pub auto_mode: bool,
    pub auto_threshold: u16,
    pub ulaw: bool,
    pub filter_hp: u32,
    pub filter_lp: u32,
    pub overflows: u64,
    pub free_bytes: Option<u64>,
    pub chunks_processed: u64,
}

pub struct RecorderControl {
    shared: Mutex<Shared>,
    recording: AtomicBool,
    rms: AtomicU32,
    zcr_bits: AtomicU32,
    overflows: AtomicU64,
    free_bytes: AtomicU64,
    chunks: AtomicU64,
}

impl Default for RecorderControl {
    fn default() -> Self {
        Self::new(RecorderSettings::default())
    }
}

impl RecorderControl {
    pub fn new(settings: RecorderSettings) -> Self {
        Self {
            shared: Mutex::new(Shared {
                pending: None,
                settings,
                session: SessionStatus::default(),
                applied_filter: None,
            }),
            recording: AtomicBool::new(false),
            rms: AtomicU32::new(0),
            zcr_bits: AtomicU32::new(0f32.to_bits()),
            overflows: AtomicU64::new(0),
            free_bytes: AtomicU64::new(FREE_BYTES_UNKNOWN),
            chunks: AtomicU64::new(0),
        }
    }

    // -- commands --

    pub fn request_start(&self) {
        debug!("Manual start requested");
        self.shared.lock().pending = Some(RecordRequest::Start);
    }

    pub fn request_stop(&self) {
        debug!("Manual stop requested");
        self.shared.lock().pending = Some(RecordRequest::Stop);
    }

    /// Update auto mode; `None` leaves a field unchanged.
    pub fn set_auto(&self, enabled: Option<bool>, threshold: Option<u16>) {
        let mut shared = self.shared.lock();
        if let Some(enabled) = enabled {
            shared.settings.auto_enabled = enabled;
        }
        if let Some(threshold) = threshold {
            shared.settings.auto_threshold = threshold;
        }
    }

    /// Corner frequencies are assumed already validated.
    pub fn set_filter(&self, highpass_hz: u32, lowpass_hz: u32) {
        let mut shared = self.shared.lock();
        shared.settings.highpass_hz = highpass_hz;
        shared.settings.lowpass_hz = lowpass_hz;
    }

    /// Takes effect at the next session start.
    pub fn set_ulaw(&self, ulaw: bool) {
        self.shared.lock().settings.ulaw = ulaw;
    }

    pub fn settings(&self) -> RecorderSettings {
        self.shared.lock().settings
    }

    /// The request the worker has not yet picked up, if any.
    pub fn pending_request(&self) -> Option<RecordRequest> {
        self.shared.lock().pending
    }

    /// Worker side: consume the pending request and copy the settings in one
    /// lock.
    pub(crate) fn take_requests(&self) -> (Option<RecordRequest>, RecorderSettings) {
        let mut shared = self.shared.lock();
        (shared.pending.take(), shared.settings)
    }

    // -- status publication (worker side) --

    pub(crate) fn publish_chunk(&self, stats: ChunkStats, overflows: u64) {
        self.rms.store(u32::from(stats.rms), Ordering::Relaxed);
        self.zcr_bits.store(stats.zcr.to_bits(), Ordering::Relaxed);
        self.overflows.store(overflows, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn publish_session(&self, info: Option<&SessionInfo>) {
        let mut shared = self.shared.lock();
        let session = &mut shared.session;
        match info {
            Some(info) => {
                if session.file_name.as_deref() != Some(info.file_name.as_str()) {
                    session.file_name = Some(info.file_name.clone());
                }
                session.provenance = Some(info.provenance);
                session.started_at = info.started_at;
            }
            None => *session = SessionStatus::default(),
        }
        self.recording.store(info.is_some(), Ordering::Relaxed);
    }

    /// Record the corners the filter chain accepted; a stage it bypassed
    /// reports 0.
    pub(crate) fn publish_filter(&self, applied: FilterSettings) {
        self.shared.lock().applied_filter = Some(applied);
    }

    pub(crate) fn publish_free_bytes(&self, free: Option<u64>) {
        self.free_bytes
            .store(free.unwrap_or(FREE_BYTES_UNKNOWN), Ordering::Relaxed);
    }

    // -- status reads --

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn current_rms(&self) -> u16 {
        self.rms.load(Ordering::Relaxed).min(u32::from(u16::MAX)) as u16
    }

    pub fn current_zcr(&self) -> f32 {
        f32::from_bits(self.zcr_bits.load(Ordering::Relaxed))
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let free = self.free_bytes.load(Ordering::Relaxed);
        let shared = self.shared.lock();
        let settings = shared.settings;
        let filter = shared.applied_filter.unwrap_or(FilterSettings {
            highpass_hz: settings.highpass_hz,
            lowpass_hz: settings.lowpass_hz,
        });

        StatusSnapshot {
            recording: self.is_recording(),
            filename: shared.session.file_name.clone(),
            rec_source: shared.session.provenance,
            rec_started_at: shared.session.started_at,
            current_rms: self.current_rms(),
            current_zcr: self.current_zcr(),
            auto_mode: settings.auto_enabled,
            auto_threshold: settings.auto_threshold,
            ulaw: settings.ulaw,
            filter_hp: filter.highpass_hz,
            filter_lp: filter.lowpass_hz,
            overflows: self.overflows.load(Ordering::Relaxed),
            free_bytes: (free != FREE_BYTES_UNKNOWN).then_some(free),
            chunks_processed: self.chunks_processed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Encoding;

    #[test]
    fn latest_record_request_wins() {
        let control = RecorderControl::default();
        control.request_start();
        control.request_stop();

        let (pending, _) = control.take_requests();
        assert_eq!(pending, Some(RecordRequest::Stop));
        assert_eq!(control.take_requests().0, None);
    }

    #[test]
    fn partial_auto_update_keeps_other_field() {
        let control = RecorderControl::default();
        control.set_auto(Some(true), None);
        control.set_auto(None, Some(900));

        let settings = control.settings();
        assert!(settings.auto_enabled);
        assert_eq!(settings.auto_threshold, 900);
    }

    #[test]
    fn snapshot_reflects_published_status() {
        let control = RecorderControl::default();
        control.set_filter(100, 8000);
        control.publish_filter(FilterSettings {
            highpass_hz: 100,
            lowpass_hz: 8000,
        });
        control.set_ulaw(true);
        control.publish_chunk(ChunkStats { rms: 1234, zcr: 0.25 }, 3);
        control.publish_free_bytes(Some(4096));
        control.publish_session(Some(&SessionInfo {
            base_name: "rec_001".into(),
            file_name: "rec_001.wav".into(),
            provenance: Provenance::Automatic,
            encoding: Encoding::MuLaw,
            started_at: None,
        }));

        let snap = control.snapshot();
        assert!(snap.recording);
        assert_eq!(snap.filename.as_deref(), Some("rec_001.wav"));
        assert_eq!(snap.rec_source, Some(Provenance::Automatic));
        assert_eq!(snap.current_rms, 1234);
        assert_eq!(snap.current_zcr, 0.25);
        assert_eq!(snap.overflows, 3);
        assert_eq!(snap.free_bytes, Some(4096));
        assert_eq!((snap.filter_hp, snap.filter_lp), (100, 8000));
        assert!(snap.ulaw);
        assert_eq!(snap.chunks_processed, 1);

        control.publish_session(None);
        let snap = control.snapshot();
        assert!(!snap.recording);
        assert!(snap.filename.is_none());
        assert!(snap.rec_source.is_none());
    }

    #[test]
    fn status_serializes_with_client_field_names() {
        let control = RecorderControl::default();
        let json = serde_json::to_value(control.snapshot()).unwrap();
        for key in [
            "recording",
            "filename",
            "rec_source",
            "current_rms",
            "current_zcr",
            "auto_mode",
            "auto_threshold",
            "ulaw",
            "filter_hp",
            "filter_lp",
            "overflows",
            "free_bytes",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["free_bytes"], serde_json::Value::Null);
    }

    #[test]
    fn status_reports_applied_filter_not_requested() {
        let control = RecorderControl::default();
        control.set_filter(100, 9500);
        assert_eq!(control.snapshot().filter_lp, 9500);

        // worker could not build the low-pass stage
        control.publish_filter(FilterSettings {
            highpass_hz: 100,
            lowpass_hz: 0,
        });
        let snap = control.snapshot();
        assert_eq!((snap.filter_hp, snap.filter_lp), (100, 0));
        assert_eq!(control.settings().lowpass_hz, 9500);
    }
}
