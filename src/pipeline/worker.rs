//! The pipeline worker.
//!
//! One thread owns everything here: the source, filter, trigger, pre-roll
//! and session manager. Each chunk runs in arrival order through
//!
//! filter → stats → status → live broadcast → requests → trigger → session
//!
//! and only the request and status steps touch the shared lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::control::{RecordRequest, RecorderControl, RecorderSettings};
use crate::audio::{
    stats, ChunkSource, FilterChain, FilterSettings, LiveBroadcaster, PreRollBuffer, ReadStatus,
    WakeSignal,
};
use crate::container::Encoding;
use crate::error::{RecorderError, Result};
use crate::recording::{
    AutoTrigger, Provenance, SessionManager, TriggerConfig, TriggerDecision,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_samples: usize,
    pub preroll_samples: usize,
    /// Longest wait for a wake signal before polling the source anyway
    pub wait_timeout: Duration,
    pub trigger: TriggerConfig,
}

impl PipelineConfig {
    pub fn new(sample_rate: u32, chunk_samples: usize) -> Self {
        Self {
            chunk_samples,
            preroll_samples: sample_rate as usize,
            wait_timeout: Duration::from_millis(100),
            trigger: TriggerConfig::default(),
        }
    }
}

pub struct Pipeline<S: ChunkSource> {
    source: S,
    wake: Arc<WakeSignal>,
    control: Arc<RecorderControl>,
    broadcaster: Arc<LiveBroadcaster>,
    filter: FilterChain,
    trigger: AutoTrigger,
    preroll: PreRollBuffer,
    sessions: SessionManager,
    /// Settings as last applied by the worker
    applied: RecorderSettings,
    chunk: Vec<i16>,
    wait_timeout: Duration,
}

impl<S: ChunkSource> Pipeline<S> {
    pub fn new(
        source: S,
        wake: Arc<WakeSignal>,
        control: Arc<RecorderControl>,
        broadcaster: Arc<LiveBroadcaster>,
        mut sessions: SessionManager,
        config: PipelineConfig,
    ) -> Self {
        let applied = control.settings();
        let filter = FilterChain::new(
            source.sample_rate(),
            FilterSettings {
                highpass_hz: applied.highpass_hz,
                lowpass_hz: applied.lowpass_hz,
            },
        );
        control.publish_filter(filter.settings());

        match sessions.refresh_free_bytes() {
            Ok(free) => control.publish_free_bytes(Some(free)),
            Err(e) => warn!("Free space query failed: {}", e),
        }

        Self {
            source,
            wake,
            control,
            broadcaster,
            filter,
            trigger: AutoTrigger::new(config.trigger),
            preroll: PreRollBuffer::new(config.preroll_samples),
            sessions,
            applied,
            chunk: vec![0; config.chunk_samples.max(1)],
            wait_timeout: config.wait_timeout,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn trigger(&self) -> &AutoTrigger {
        &self.trigger
    }

    pub fn filter(&self) -> &FilterChain {
        &self.filter
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Loop until `running` clears, then close any open session.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(
            "Pipeline running ({} Hz, {}-sample chunks)",
            self.source.sample_rate(),
            self.chunk.len()
        );

        while running.load(Ordering::Relaxed) {
            // A missed or coalesced wake only costs one timeout; the source
            // is drained either way.
            self.wake.wait_timeout(self.wait_timeout);
            self.drain();
        }

        self.shutdown();
        if let Err(e) = self.source.stop() {
            warn!("Failed to stop audio source: {}", e);
        }
        info!("Pipeline stopped");
    }

    /// Process every chunk the source has ready. Returns the number processed.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        let mut chunk = std::mem::take(&mut self.chunk);
        loop {
            match self.source.read_chunk(&mut chunk) {
                ReadStatus::Ready(0) | ReadStatus::Timeout => break,
                ReadStatus::Ready(n) => {
                    self.process_chunk(&mut chunk[..n]);
                    processed += 1;
                }
            }
        }
        self.chunk = chunk;
        processed
    }

    /// Close any open session.
    pub fn shutdown(&mut self) {
        if self.sessions.is_open() {
            if let Err(e) = self.sessions.request_stop() {
                error!("Failed to close recording on shutdown: {}", e);
            }
            self.trigger.enter_idle();
            self.control.publish_session(None);
        }
    }

    fn process_chunk(&mut self, samples: &mut [i16]) {
        self.filter.process_in_place(samples);
        let stats = stats::analyze(samples);
        self.control
            .publish_chunk(stats, self.source.overflow_count());

        // best effort, before any recording state is touched
        self.broadcaster.broadcast(samples);

        let (request, settings) = self.control.take_requests();
        self.apply_settings(settings);

        let decision = if settings.auto_enabled {
            self.trigger
                .evaluate(stats, settings.auto_threshold, self.sessions.is_open())
        } else {
            TriggerDecision::Hold
        };

        // An explicit request overrides the trigger's own decision.
        match request {
            Some(RecordRequest::Stop) => self.manual_stop(),
            Some(RecordRequest::Start) => self.manual_start(settings),
            None => self.apply_decision(decision, settings),
        }

        if self.sessions.is_open() {
            if let Err(e) = self.sessions.append(samples) {
                self.abandon(e);
            }
        } else {
            self.preroll.push(samples);
        }

        match self.sessions.tick() {
            Ok(Some(_)) => self.trigger.enter_idle(),
            Ok(None) => {}
            Err(e) => warn!("Free space query failed: {}", e),
        }
        self.control.publish_free_bytes(self.sessions.last_free_bytes());
        self.control.publish_session(self.sessions.info());
    }

    fn apply_settings(&mut self, settings: RecorderSettings) {
        let previous = std::mem::replace(&mut self.applied, settings);

        if (settings.highpass_hz, settings.lowpass_hz)
            != (previous.highpass_hz, previous.lowpass_hz)
        {
            self.filter
                .configure(settings.highpass_hz, settings.lowpass_hz);
            self.control.publish_filter(self.filter.settings());
        }

        match (previous.auto_enabled, settings.auto_enabled) {
            (false, true) => {
                info!("Auto mode enabled (threshold {})", settings.auto_threshold);
                self.trigger.reset();
            }
            (true, false) => {
                info!("Auto mode disabled");
                if self.sessions.provenance() == Some(Provenance::Automatic) {
                    self.close_session();
                }
                self.trigger.reset();
            }
            _ => {}
        }
    }

    fn manual_stop(&mut self) {
        if self.sessions.is_open() {
            self.close_session();
        } else {
            debug!("Stop requested with no recording open");
        }
        self.trigger.enter_idle();
    }

    fn manual_start(&mut self, settings: RecorderSettings) {
        match self.sessions.provenance() {
            Some(Provenance::Manual) => {
                debug!("Start requested while already recording");
                return;
            }
            Some(Provenance::Automatic) => {
                info!("Manual start replaces automatic recording");
                self.close_session();
                self.trigger.enter_idle();
            }
            None => {}
        }

        self.preroll.clear();
        if let Err(e) = self
            .sessions
            .request_start(Provenance::Manual, encoding_for(settings))
        {
            warn!("Manual start failed: {}", e);
        }
    }

    fn apply_decision(&mut self, decision: TriggerDecision, settings: RecorderSettings) {
        match decision {
            TriggerDecision::Hold => {}
            TriggerDecision::Start => {
                match self
                    .sessions
                    .request_start(Provenance::Automatic, encoding_for(settings))
                {
                    Ok(_) => {
                        self.trigger.enter_recording();
                        self.flush_preroll();
                    }
                    Err(e) => {
                        warn!("Auto start failed: {}", e);
                        self.trigger.enter_idle();
                    }
                }
            }
            TriggerDecision::Stop => {
                if self.sessions.provenance() == Some(Provenance::Automatic) {
                    self.close_session();
                }
                self.trigger.enter_idle();
            }
        }
    }

    /// Write the pre-roll into the session that was just opened, oldest first.
    fn flush_preroll(&mut self) {
        let (first, second) = self.preroll.drain_oldest_first();
        let lead_in = first.len() + second.len();
        let written = self
            .sessions
            .append(first)
            .and_then(|_| self.sessions.append(second));
        match written {
            Ok(()) => debug!("Pre-roll: {} samples", lead_in),
            Err(e) => self.abandon(e),
        }
    }

    fn close_session(&mut self) {
        if let Err(e) = self.sessions.request_stop() {
            error!("Failed to close recording: {}", e);
        }
    }

    /// I/O failure during a session: drop it and keep processing.
    fn abandon(&mut self, cause: RecorderError) {
        error!("Recording I/O failed: {}", cause);
        self.sessions.abandon();
        self.trigger.enter_idle();
    }
}

/// The pipeline running on a blocking worker thread.
///
/// Dropping the handle stops the loop, so an early return anywhere in the
/// service cannot leave the worker spinning.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    wake: Arc<WakeSignal>,
    task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Move `pipeline` onto tokio's blocking pool and start its loop.
    pub fn spawn<S: ChunkSource + 'static>(mut pipeline: Pipeline<S>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::clone(&pipeline.wake);
        let task = {
            let running = Arc::clone(&running);
            tokio::task::spawn_blocking(move || pipeline.run(&running))
        };

        Self {
            running,
            wake,
            task: Some(task),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the loop and wait for the open session to be closed.
    pub async fn stop(mut self) -> Result<()> {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| RecorderError::Other(anyhow::Error::new(e)))?;
        }
        Ok(())
    }

    fn signal_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.wake.notify();
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Pipeline handle dropped; stopping worker");
            self.signal_stop();
        }
    }
}

fn encoding_for(settings: RecorderSettings) -> Encoding {
    if settings.ulaw {
        Encoding::MuLaw
    } else {
        Encoding::Linear
    }
}

