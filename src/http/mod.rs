//! HTTP control and status API
//!
//! Thin adapter over [`RecorderControl`](crate::pipeline::RecorderControl):
//! - GET /health - Health check
//! - GET /api/status - Recorder status snapshot
//! - POST /api/rec/start, /api/rec/stop - Manual recording
//! - POST /api/auto - Auto mode and threshold
//! - POST /api/codec - µ-law on/off
//! - POST /api/filter - Filter corner frequencies (range-checked here)
//! - GET /api/files - Recordings on disk
//! - GET, DELETE /api/files/:name - Download or delete one recording
//! - GET /ws - Live PCM stream (WebSocket) with start/stop commands

mod handlers;
mod routes;
mod state;

pub use handlers::{apply_live_command, HIGHPASS_RANGE_HZ, LOWPASS_RANGE_HZ};
pub use routes::create_router;
pub use state::AppState;
