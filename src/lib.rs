pub mod audio;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod nats;
pub mod pipeline;
pub mod recording;

pub use audio::{
    AcquisitionDriver, AdcSource, ChunkSource, ChunkStats, FileDriver, FilterChain,
    FilterSettings, LiveBroadcaster, PreRollBuffer, ReadStatus, ReplaySource, WakeSignal,
};
pub use config::Config;
pub use container::{read_container, ContainerSpec, ContainerWriter, Encoding, WavHeader};
pub use error::{RecorderError, Result};
pub use http::{create_router, AppState};
pub use nats::{AudioFrameMessage, NatsClient};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineHandle, RecorderControl, RecorderSettings, StatusSnapshot,
};
pub use recording::{
    AutoTrigger, Provenance, QuotaProbe, SessionConfig, SessionManager, SpaceProbe, SystemClock,
    TriggerConfig, WallClock,
};
