//! Adaptive auto-record trigger.
//!
//! ## Algorithm (per chunk)
//!
//! 1. Smooth raw RMS and ZCR with fast exponential averages.
//! 2. While idle with no session open, let a slow average track the ambient
//!    noise floor. It is frozen while recording.
//! 3. Trigger level = max(user threshold, noise floor × multiplier); silence
//!    level is a fraction of the trigger level.
//! 4. "Loud" = smoothed RMS ≥ trigger level and smoothed ZCR below the
//!    ceiling (broadband hiss has a high ZCR).
//! 5. `Idle → Recording` after `trigger_streak` consecutive loud chunks;
//!    `Recording → Idle` after `silence_timeout_chunks` consecutive quiet ones.
//!
//! The trigger only *decides*. The pipeline confirms a transition by calling
//! [`AutoTrigger::enter_recording`] once a session is actually open and
//! [`AutoTrigger::enter_idle`] whenever one closes.

use serde::Serialize;
use tracing::{debug, info};

use crate::audio::ChunkStats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    /// Smoothing factor of the fast RMS average
    pub rms_alpha: f32,
    /// Smoothing factor of the ZCR average
    pub zcr_alpha: f32,
    /// Smoothing factor of the ambient noise floor
    pub noise_alpha: f32,
    pub noise_multiplier: f32,
    /// Silence level as a fraction of the trigger level
    pub silence_fraction: f32,
    /// Smoothed ZCR at or above this never counts as loud
    pub zcr_ceiling: f32,
    /// Consecutive loud chunks needed to start
    pub trigger_streak: u32,
    /// Consecutive quiet chunks needed to stop
    pub silence_timeout_chunks: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            rms_alpha: 0.5,
            zcr_alpha: 0.5,
            noise_alpha: 0.005,
            noise_multiplier: 3.0,
            silence_fraction: 0.7,
            zcr_ceiling: 0.40,
            trigger_streak: 3,
            silence_timeout_chunks: 3000, // 60 s of 20 ms chunks
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Hold,
    Start,
    Stop,
}

/// Smoothed signal statistics and streak counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NoiseModel {
    pub smoothed_rms: f32,
    pub noise_floor: f32,
    pub smoothed_zcr: f32,
    pub loud_streak: u32,
    pub quiet_streak: u32,
    seeded: bool,
}

pub struct AutoTrigger {
    config: TriggerConfig,
    state: TriggerState,
    model: NoiseModel,
}

impl AutoTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::Idle,
            model: NoiseModel::default(),
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn model(&self) -> &NoiseModel {
        &self.model
    }

    /// Effective trigger level for a user floor `threshold`.
    pub fn trigger_level(&self, threshold: u16) -> f32 {
        f32::from(threshold).max(self.model.noise_floor * self.config.noise_multiplier)
    }

    pub fn silence_level(&self, threshold: u16) -> f32 {
        self.trigger_level(threshold) * self.config.silence_fraction
    }

    /// Feed one chunk's statistics. `session_open` reports whether any
    /// session (manual or automatic) is currently open.
    pub fn evaluate(
        &mut self,
        stats: ChunkStats,
        threshold: u16,
        session_open: bool,
    ) -> TriggerDecision {
        let rms = f32::from(stats.rms);
        let cfg = self.config;
        let model = &mut self.model;

        if !model.seeded {
            model.smoothed_rms = rms;
            model.smoothed_zcr = stats.zcr;
            model.noise_floor = rms;
            model.seeded = true;
        } else {
            model.smoothed_rms += cfg.rms_alpha * (rms - model.smoothed_rms);
            model.smoothed_zcr += cfg.zcr_alpha * (stats.zcr - model.smoothed_zcr);
            if self.state == TriggerState::Idle && !session_open {
                model.noise_floor += cfg.noise_alpha * (rms - model.noise_floor);
            }
        }

        let trigger_level = self.trigger_level(threshold);
        let silence_level = trigger_level * cfg.silence_fraction;
        let model = &mut self.model;

        match self.state {
            TriggerState::Idle => {
                let loud =
                    model.smoothed_rms >= trigger_level && model.smoothed_zcr < cfg.zcr_ceiling;
                if session_open || !loud {
                    model.loud_streak = 0;
                    return TriggerDecision::Hold;
                }
                model.loud_streak += 1;
                if model.loud_streak >= cfg.trigger_streak {
                    info!(
                        "Auto trigger: rms={:.0} zcr={:.2} level={:.0} floor={:.0}",
                        model.smoothed_rms, model.smoothed_zcr, trigger_level, model.noise_floor
                    );
                    TriggerDecision::Start
                } else {
                    TriggerDecision::Hold
                }
            }
            TriggerState::Recording => {
                if model.smoothed_rms < silence_level {
                    model.quiet_streak += 1;
                } else {
                    model.quiet_streak = 0;
                }
                if model.quiet_streak >= cfg.silence_timeout_chunks {
                    info!(
                        "Auto trigger: {} quiet chunks below {:.0}",
                        model.quiet_streak, silence_level
                    );
                    TriggerDecision::Stop
                } else {
                    TriggerDecision::Hold
                }
            }
        }
    }

    /// An automatic session is now open.
    pub fn enter_recording(&mut self) {
        self.state = TriggerState::Recording;
        self.model.loud_streak = 0;
        self.model.quiet_streak = 0;
    }

    /// Whatever session was open is closed (or never opened).
    pub fn enter_idle(&mut self) {
        if self.state != TriggerState::Idle {
            debug!("Auto trigger back to idle");
        }
        self.state = TriggerState::Idle;
        self.model.loud_streak = 0;
        self.model.quiet_streak = 0;
    }

    /// Forget all history; the next chunk re-seeds the noise model.
    pub fn reset(&mut self) {
        self.state = TriggerState::Idle;
        self.model = NoiseModel::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats(rms: u16, zcr: f32) -> ChunkStats {
        ChunkStats { rms, zcr }
    }

    /// Drive the trigger the way the pipeline does, confirming every start.
    fn feed(trigger: &mut AutoTrigger, chunk: ChunkStats, threshold: u16) -> TriggerDecision {
        let decision = trigger.evaluate(chunk, threshold, trigger.state() == TriggerState::Recording);
        match decision {
            TriggerDecision::Start => trigger.enter_recording(),
            TriggerDecision::Stop => trigger.enter_idle(),
            TriggerDecision::Hold => {}
        }
        decision
    }

    fn unsmoothed() -> TriggerConfig {
        TriggerConfig {
            rms_alpha: 1.0,
            zcr_alpha: 1.0,
            ..TriggerConfig::default()
        }
    }

    #[test]
    fn one_short_of_streak_never_starts() {
        let mut trigger = AutoTrigger::new(unsmoothed());
        let streak = trigger.config().trigger_streak;

        for _ in 0..50 {
            feed(&mut trigger, stats(40, 0.1), 2000);
        }
        for _ in 0..streak - 1 {
            assert_eq!(feed(&mut trigger, stats(20_000, 0.1), 2000), TriggerDecision::Hold);
        }
        for _ in 0..200 {
            assert_eq!(feed(&mut trigger, stats(40, 0.1), 2000), TriggerDecision::Hold);
        }
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[test]
    fn full_streak_starts_on_last_loud_chunk() {
        let mut trigger = AutoTrigger::new(unsmoothed());
        let streak = trigger.config().trigger_streak;

        for _ in 0..50 {
            feed(&mut trigger, stats(40, 0.1), 2000);
        }
        for i in 1..=streak {
            let decision = feed(&mut trigger, stats(20_000, 0.1), 2000);
            if i < streak {
                assert_eq!(decision, TriggerDecision::Hold);
            } else {
                assert_eq!(decision, TriggerDecision::Start);
            }
        }
        assert_eq!(trigger.state(), TriggerState::Recording);
    }

    #[test]
    fn high_zcr_noise_does_not_trigger() {
        let mut trigger = AutoTrigger::new(TriggerConfig::default());
        for _ in 0..20 {
            feed(&mut trigger, stats(40, 0.1), 2000);
        }
        for _ in 0..100 {
            assert_eq!(feed(&mut trigger, stats(5000, 0.6), 2000), TriggerDecision::Hold);
        }
    }

    #[test]
    fn noise_floor_raises_trigger_level() {
        let mut trigger = AutoTrigger::new(TriggerConfig::default());
        for _ in 0..2000 {
            feed(&mut trigger, stats(1000, 0.1), 100);
        }
        assert_relative_eq!(trigger.model().noise_floor, 1000.0, epsilon = 1.0);
        assert_relative_eq!(trigger.trigger_level(100), 3000.0, epsilon = 3.0);

        // loud relative to the user floor, quiet relative to the ambient level
        for _ in 0..10 {
            assert_eq!(feed(&mut trigger, stats(2500, 0.1), 100), TriggerDecision::Hold);
        }
    }

    #[test]
    fn noise_floor_frozen_while_recording() {
        let mut trigger = AutoTrigger::new(TriggerConfig::default());
        for _ in 0..50 {
            feed(&mut trigger, stats(50, 0.1), 2000);
        }
        for _ in 0..3 {
            feed(&mut trigger, stats(20_000, 0.1), 2000);
        }
        assert_eq!(trigger.state(), TriggerState::Recording);
        let floor = trigger.model().noise_floor;

        for _ in 0..500 {
            feed(&mut trigger, stats(10_000, 0.1), 2000);
        }
        assert_eq!(trigger.model().noise_floor, floor);
    }

    #[test]
    fn silence_timeout_stops_after_configured_chunks() {
        let config = TriggerConfig {
            silence_timeout_chunks: 10,
            ..TriggerConfig::default()
        };
        let mut trigger = AutoTrigger::new(config);
        for _ in 0..20 {
            feed(&mut trigger, stats(40, 0.1), 2000);
        }
        for _ in 0..3 {
            feed(&mut trigger, stats(20_000, 0.1), 2000);
        }
        assert_eq!(trigger.state(), TriggerState::Recording);

        let mut stopped_at = None;
        for i in 1..=30 {
            if feed(&mut trigger, stats(0, 0.0), 2000) == TriggerDecision::Stop {
                stopped_at = Some(i);
                break;
            }
        }
        // smoothed RMS needs a few chunks to fall under the silence level
        let stopped_at = stopped_at.expect("never stopped");
        assert!((10..=20).contains(&stopped_at), "stopped at {stopped_at}");
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[test]
    fn open_manual_session_blocks_start_and_freezes_floor() {
        let mut trigger = AutoTrigger::new(TriggerConfig::default());
        trigger.evaluate(stats(50, 0.1), 2000, false);
        let floor = trigger.model().noise_floor;

        for _ in 0..20 {
            assert_eq!(
                trigger.evaluate(stats(20_000, 0.1), 2000, true),
                TriggerDecision::Hold
            );
        }
        assert_eq!(trigger.model().noise_floor, floor);
        assert_eq!(trigger.model().loud_streak, 0);
    }

    #[test]
    fn reset_reseeds_from_next_chunk() {
        let mut trigger = AutoTrigger::new(TriggerConfig::default());
        feed(&mut trigger, stats(500, 0.2), 2000);
        trigger.reset();
        feed(&mut trigger, stats(60, 0.05), 2000);

        assert_relative_eq!(trigger.model().noise_floor, 60.0);
        assert_relative_eq!(trigger.model().smoothed_rms, 60.0);
        assert_relative_eq!(trigger.model().smoothed_zcr, 0.05);
    }
}
