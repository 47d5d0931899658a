pub mod broadcast;
pub mod filter;
pub mod preroll;
pub mod source;
pub mod stats;
pub mod wake;

pub use broadcast::{LiveBroadcaster, LivePayload, LiveSubscription};
pub use filter::{FilterChain, FilterSettings};
pub use preroll::PreRollBuffer;
pub use source::{
    convert_adc_word, AcquisitionDriver, AdcSource, ChunkSource, FileDriver, ReadStatus,
    ReplaySource,
};
pub use stats::ChunkStats;
pub use wake::WakeSignal;

/// Acquisition rate of the single analog input.
pub const DEFAULT_SAMPLE_RATE: u32 = 20_000;

/// Samples per acquisition cycle (20 ms at 20 kHz).
pub const DEFAULT_CHUNK_SAMPLES: usize = 400;
