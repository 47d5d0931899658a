pub mod naming;
pub mod session;
pub mod storage;
pub mod trigger;
pub mod write_buffer;

pub use naming::{NoClock, SystemClock, WallClock};
pub use session::{
    ClosedSession, CloseReason, Provenance, SessionConfig, SessionInfo, SessionManager,
};
pub use storage::{FixedProbe, QuotaProbe, SpaceProbe};
pub use trigger::{AutoTrigger, NoiseModel, TriggerConfig, TriggerDecision, TriggerState};
pub use write_buffer::WriteBuffer;
