//! Per-chunk signal statistics: RMS energy and zero-crossing rate.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChunkStats {
    /// Root-mean-square amplitude, rounded
    pub rms: u16,
    /// Fraction of adjacent sample pairs whose sign differs
    pub zcr: f32,
}

pub fn analyze(samples: &[i16]) -> ChunkStats {
    ChunkStats {
        rms: rms(samples),
        zcr: zero_crossing_rate(samples),
    }
}

pub fn rms(samples: &[i16]) -> u16 {
    if samples.is_empty() {
        return 0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt().round();
    rms.min(f64::from(u16::MAX)) as u16
}

/// Sign changes between adjacent samples over `len - 1`; 0 for fewer than
/// two samples. Zero counts as positive.
pub fn zero_crossing_rate(samples: &[i16]) -> f32 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] < 0) != (pair[1] < 0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_square_wave_is_its_amplitude() {
        let samples: Vec<i16> = (0..400).map(|i| if i % 2 == 0 { 3000 } else { -3000 }).collect();
        assert_eq!(rms(&samples), 3000);
    }

    #[test]
    fn rms_rounds_to_nearest() {
        // sqrt((1 + 4) / 2) = 1.58
        assert_eq!(rms(&[1, 2]), 2);
        assert_eq!(rms(&[]), 0);
    }

    #[test]
    fn rms_of_full_scale_fits_u16() {
        assert_eq!(rms(&[i16::MIN; 16]), 32768);
    }

    #[test]
    fn zcr_counts_sign_flips() {
        assert_relative_eq!(zero_crossing_rate(&[1, -1, 1, -1, 1]), 1.0);
        assert_relative_eq!(zero_crossing_rate(&[5, 5, 5, 5]), 0.0);
        assert_relative_eq!(zero_crossing_rate(&[1, -1, -1, -1, -1]), 0.25);
    }

    #[test]
    fn zcr_is_zero_for_short_chunks() {
        assert_eq!(zero_crossing_rate(&[]), 0.0);
        assert_eq!(zero_crossing_rate(&[-100]), 0.0);
    }

    #[test]
    fn analyze_combines_both() {
        let stats = analyze(&[100, -100, 100, -100]);
        assert_eq!(stats.rms, 100);
        assert_relative_eq!(stats.zcr, 1.0);
    }
}
