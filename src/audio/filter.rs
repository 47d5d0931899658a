//! Cascaded high-pass / low-pass filter chain.
//!
//! Each stage is a Butterworth (Q = 1/√2) biquad in direct form II
//! transposed, coefficients from the bilinear transform of the analog
//! prototype. A corner frequency of 0 bypasses the stage. Reconfiguring
//! rebuilds both stages with zeroed state.

use biquad::{
    Biquad, Coefficients, DirectForm2Transposed, Errors, ToHertz, Type, Q_BUTTERWORTH_F32,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Corner frequencies of the chain; 0 disables a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    pub highpass_hz: u32,
    pub lowpass_hz: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageKind {
    HighPass,
    LowPass,
}

pub struct FilterChain {
    sample_rate: u32,
    settings: FilterSettings,
    highpass: Option<DirectForm2Transposed<f32>>,
    lowpass: Option<DirectForm2Transposed<f32>>,
}

impl FilterChain {
    pub fn new(sample_rate: u32, settings: FilterSettings) -> Self {
        let mut chain = Self {
            sample_rate,
            settings: FilterSettings::default(),
            highpass: None,
            lowpass: None,
        };
        chain.configure(settings.highpass_hz, settings.lowpass_hz);
        chain
    }

    /// Rebuild both stages. Range validation is the caller's job; a corner
    /// the bilinear transform rejects (at or above Nyquist) leaves that
    /// stage bypassed.
    pub fn configure(&mut self, highpass_hz: u32, lowpass_hz: u32) {
        self.highpass = self.build_stage(StageKind::HighPass, highpass_hz);
        self.lowpass = self.build_stage(StageKind::LowPass, lowpass_hz);
        self.settings = FilterSettings {
            highpass_hz: if self.highpass.is_some() { highpass_hz } else { 0 },
            lowpass_hz: if self.lowpass.is_some() { lowpass_hz } else { 0 },
        };

        info!(
            "Filter configured: hp={} Hz, lp={} Hz @ {} Hz",
            self.settings.highpass_hz, self.settings.lowpass_hz, self.sample_rate
        );
    }

    fn build_stage(&self, kind: StageKind, corner_hz: u32) -> Option<DirectForm2Transposed<f32>> {
        if corner_hz == 0 {
            return None;
        }
        match stage_coefficients(kind, self.sample_rate, corner_hz) {
            Ok(coeffs) => Some(DirectForm2Transposed::<f32>::new(coeffs)),
            Err(e) => {
                warn!(
                    "Cannot build {:?} stage at {} Hz (fs={}): {:?}; stage bypassed",
                    kind, corner_hz, self.sample_rate, e
                );
                None
            }
        }
    }

    pub fn settings(&self) -> FilterSettings {
        self.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_bypassed(&self) -> bool {
        self.highpass.is_none() && self.lowpass.is_none()
    }

    /// Filter one sample: high-pass, then low-pass, then clamp to 16 bits.
    #[inline]
    pub fn process(&mut self, sample: i16) -> i16 {
        if self.is_bypassed() {
            return sample;
        }

        let mut y = f32::from(sample);
        if let Some(hp) = &mut self.highpass {
            y = hp.run(y);
        }
        if let Some(lp) = &mut self.lowpass {
            y = lp.run(y);
        }
        y.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
    }

    pub fn process_in_place(&mut self, samples: &mut [i16]) {
        if self.is_bypassed() {
            return;
        }
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

fn stage_coefficients(
    kind: StageKind,
    sample_rate: u32,
    corner_hz: u32,
) -> Result<Coefficients<f32>, Errors> {
    let filter = match kind {
        StageKind::HighPass => Type::HighPass,
        StageKind::LowPass => Type::LowPass,
    };
    Coefficients::<f32>::from_params(
        filter,
        (sample_rate as f32).hz(),
        (corner_hz as f32).hz(),
        Q_BUTTERWORTH_F32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, amplitude: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|n| {
                let t = n as f32 / sample_rate as f32;
                (amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()) as i16
            })
            .collect()
    }

    fn peak(samples: &[i16]) -> i32 {
        samples.iter().map(|&s| i32::from(s).abs()).max().unwrap_or(0)
    }

    #[test]
    fn disabled_stages_are_identity() {
        for rate in [8_000u32, 16_000, 20_000, 44_100, 48_000] {
            let mut chain = FilterChain::new(rate, FilterSettings::default());
            for x in [i16::MIN, -12345, -1, 0, 1, 777, i16::MAX] {
                assert_eq!(chain.process(x), x);
            }
        }
    }

    #[test]
    fn highpass_removes_dc() {
        let mut chain = FilterChain::new(
            20_000,
            FilterSettings {
                highpass_hz: 100,
                lowpass_hz: 0,
            },
        );
        let mut samples = vec![8000i16; 20_000];
        chain.process_in_place(&mut samples);

        assert!(peak(&samples[19_000..]) < 50, "dc leaked through");
    }

    #[test]
    fn lowpass_attenuates_above_corner() {
        let settings = FilterSettings {
            highpass_hz: 0,
            lowpass_hz: 2000,
        };
        let mut chain = FilterChain::new(20_000, settings);
        let mut high = sine(8000.0, 20_000, 10_000.0, 4000);
        chain.process_in_place(&mut high);

        let mut chain = FilterChain::new(20_000, settings);
        let mut low = sine(200.0, 20_000, 10_000.0, 4000);
        chain.process_in_place(&mut low);

        assert!(peak(&high[2000..]) < 1500);
        assert!(peak(&low[2000..]) > 9000);
    }

    #[test]
    fn output_is_clamped_to_sixteen_bits() {
        let mut chain = FilterChain::new(
            20_000,
            FilterSettings {
                highpass_hz: 50,
                lowpass_hz: 9500,
            },
        );
        let mut square: Vec<i16> = (0..2000)
            .map(|n| if (n / 20) % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        chain.process_in_place(&mut square);
        // overshoot from the step response must saturate, not wrap
        assert!(square.iter().any(|&s| s == i16::MAX || s == i16::MIN));
    }

    #[test]
    fn reconfigure_resets_state_and_nyquist_corner_bypasses() {
        let mut chain = FilterChain::new(
            20_000,
            FilterSettings {
                highpass_hz: 0,
                lowpass_hz: 15_000,
            },
        );
        assert!(chain.is_bypassed());
        assert_eq!(chain.settings().lowpass_hz, 0);

        chain.configure(200, 0);
        for _ in 0..100 {
            chain.process(10_000);
        }
        chain.configure(200, 0);
        // fresh state: first output of a high-pass is b0 * x, not the tail of the old input
        let first = chain.process(0);
        assert_eq!(first, 0);
    }
}
