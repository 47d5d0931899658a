pub mod control;
pub mod worker;

pub use control::{RecordRequest, RecorderControl, RecorderSettings, StatusSnapshot};
pub use worker::{Pipeline, PipelineConfig, PipelineHandle};
