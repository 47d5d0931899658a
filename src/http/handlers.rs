use super::state::AppState;
use crate::audio::broadcast::{CLIENT_QUEUE_CHUNKS, MAX_LIVE_CLIENTS};
use crate::audio::{LiveBroadcaster, LiveSubscription};
use crate::pipeline::{RecordRequest, RecorderControl};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Accepted high-pass corners besides 0 (off)
pub const HIGHPASS_RANGE_HZ: std::ops::RangeInclusive<u32> = 50..=2000;
/// Accepted low-pass corners besides 0 (off)
pub const LOWPASS_RANGE_HZ: std::ops::RangeInclusive<u32> = 2000..=9500;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AutoRequest {
    pub enabled: Option<bool>,
    pub threshold: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct AutoResponse {
    pub auto_mode: bool,
    pub auto_threshold: u16,
}

#[derive(Debug, Deserialize)]
pub struct CodecRequest {
    pub ulaw: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CodecResponse {
    pub ulaw: bool,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub hp: Option<u32>,
    pub lp: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub filter_hp: u32,
    pub filter_lp: u32,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub action: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Text frame sent by a live client
#[derive(Debug, Deserialize)]
pub struct LiveCommand {
    pub cmd: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.control.snapshot())
}

/// POST /api/rec/start
/// Queued; the pipeline acts on it with its next chunk
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("HTTP: start recording");
    state.control.request_start();
    (
        StatusCode::ACCEPTED,
        Json(RecordResponse {
            action: "start",
            status: "queued",
        }),
    )
}

/// POST /api/rec/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("HTTP: stop recording");
    state.control.request_stop();
    (
        StatusCode::ACCEPTED,
        Json(RecordResponse {
            action: "stop",
            status: "queued",
        }),
    )
}

/// POST /api/auto
pub async fn set_auto(
    State(state): State<AppState>,
    Json(req): Json<AutoRequest>,
) -> impl IntoResponse {
    state.control.set_auto(req.enabled, req.threshold);
    let settings = state.control.settings();
    Json(AutoResponse {
        auto_mode: settings.auto_enabled,
        auto_threshold: settings.auto_threshold,
    })
}

/// POST /api/codec
pub async fn set_codec(
    State(state): State<AppState>,
    Json(req): Json<CodecRequest>,
) -> impl IntoResponse {
    if let Some(ulaw) = req.ulaw {
        state.control.set_ulaw(ulaw);
    }
    Json(CodecResponse {
        ulaw: state.control.settings().ulaw,
    })
}

/// POST /api/filter
/// Out-of-range corners are ignored and the current value kept
pub async fn set_filter(
    State(state): State<AppState>,
    Json(req): Json<FilterRequest>,
) -> impl IntoResponse {
    let current = state.control.settings();
    let hp = req
        .hp
        .filter(|&hz| hz == 0 || HIGHPASS_RANGE_HZ.contains(&hz))
        .unwrap_or(current.highpass_hz);
    let lp = req
        .lp
        .filter(|&hz| hz == 0 || LOWPASS_RANGE_HZ.contains(&hz))
        .unwrap_or(current.lowpass_hz);

    state.control.set_filter(hp, lp);
    Json(FilterResponse {
        filter_hp: hp,
        filter_lp: lp,
    })
}

/// GET /api/files
pub async fn list_files(State(state): State<AppState>) -> impl IntoResponse {
    let dir = state.recordings_dir.as_ref().clone();
    match tokio::task::spawn_blocking(move || scan_recordings(&dir)).await {
        Ok(Ok(files)) => (StatusCode::OK, Json(files)).into_response(),
        Ok(Err(e)) => {
            error!("Failed to list recordings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to list recordings: {}", e),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Recording scan panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn scan_recordings(dir: &std::path::Path) -> std::io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(".wav") {
            continue;
        }
        files.push(FileEntry {
            name,
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Resolve a recording name inside the recordings directory. Only bare
/// `.wav` file names are accepted, so nothing outside the directory can be
/// reached.
fn recording_path(state: &AppState, name: &str) -> Option<PathBuf> {
    let valid = name.len() > ".wav".len()
        && name.ends_with(".wav")
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..");
    valid.then(|| state.recordings_dir.join(name))
}

/// GET /api/files/:name
pub async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(path) = recording_path(&state, &name) else {
        warn!("Rejected download of {:?}", name);
        return error_response(StatusCode::BAD_REQUEST, "Invalid file name");
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            info!("HTTP: download {} ({} bytes)", name, bytes.len());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "audio/wav".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "File not found")
        }
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read {}: {}", name, e),
            )
        }
    }
}

/// DELETE /api/files/:name
/// The recording currently being written cannot be deleted
pub async fn delete_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(path) = recording_path(&state, &name) else {
        warn!("Rejected delete of {:?}", name);
        return error_response(StatusCode::BAD_REQUEST, "Invalid file name");
    };

    if state.control.snapshot().filename.as_deref() == Some(name.as_str()) {
        return error_response(StatusCode::CONFLICT, "File is being recorded");
    }

    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            info!("HTTP: deleted {}", name);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "File not found")
        }
        Err(e) => {
            error!("Failed to delete {}: {}", path.display(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete {}: {}", name, e),
            )
        }
    }
}

/// GET /ws
/// Live PCM as binary frames; text frames `{"cmd":"start_rec"}` and
/// `{"cmd":"stop_rec"}` drive manual recording
pub async fn live_stream(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let Some(broadcaster) = state.live.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Live stream not available");
    };
    let Some(subscription) = broadcaster.subscribe(CLIENT_QUEUE_CHUNKS) else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("All {} live slots in use", MAX_LIVE_CLIENTS),
        );
    };

    let control = Arc::clone(&state.control);
    upgrade.on_upgrade(move |socket| serve_live_client(socket, control, broadcaster, subscription))
}

async fn serve_live_client(
    mut socket: WebSocket,
    control: Arc<RecorderControl>,
    broadcaster: Arc<LiveBroadcaster>,
    mut subscription: LiveSubscription,
) {
    let id = subscription.id;
    loop {
        tokio::select! {
            payload = subscription.rx.recv() => match payload {
                Some(payload) => {
                    if socket.send(Message::Binary(payload.to_vec())).await.is_err() {
                        break;
                    }
                }
                // deregistered by the broadcaster
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    apply_live_command(&control, &text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    broadcaster.unsubscribe(id);
    debug!("Live client {} closed", id);
}

/// Map a live client's text frame onto the recorder. A start while recording
/// or a stop while idle is ignored. Returns the request that was queued.
pub fn apply_live_command(control: &RecorderControl, text: &str) -> Option<RecordRequest> {
    let command: LiveCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("Ignoring malformed live command {:?}: {}", text, e);
            return None;
        }
    };

    match command.cmd.as_str() {
        "start_rec" if !control.is_recording() => {
            info!("Live client: start recording");
            control.request_start();
            Some(RecordRequest::Start)
        }
        "stop_rec" if control.is_recording() => {
            info!("Live client: stop recording");
            control.request_stop();
            Some(RecordRequest::Stop)
        }
        "start_rec" | "stop_rec" => None,
        other => {
            debug!("Ignoring unknown live command {:?}", other);
            None
        }
    }
}
