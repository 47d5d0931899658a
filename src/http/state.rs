use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::LiveBroadcaster;
use crate::pipeline::RecorderControl;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Command/status surface of the running pipeline
    pub control: Arc<RecorderControl>,
    /// Directory served under `/api/files`
    pub recordings_dir: Arc<PathBuf>,
    /// Live audio fan-out behind `/ws`; without one the stream is unavailable
    pub live: Option<Arc<LiveBroadcaster>>,
}

impl AppState {
    pub fn new(control: Arc<RecorderControl>, recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            control,
            recordings_dir: Arc::new(recordings_dir.into()),
            live: None,
        }
    }

    pub fn with_live(mut self, broadcaster: Arc<LiveBroadcaster>) -> Self {
        self.live = Some(broadcaster);
        self
    }
}
