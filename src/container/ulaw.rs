//! G.711 µ-law companding (16-bit linear <-> 8-bit logarithmic).

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode one linear sample as a µ-law byte.
///
/// Sign-magnitude with a 3-bit exponent and 4-bit mantissa, stored
/// ones'-complemented.
pub fn encode(sample: i16) -> u8 {
    let mut magnitude = i32::from(sample);
    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let biased = magnitude.min(CLIP) + BIAS;

    // biased is in [0x84, 0x7FFF], so biased >> 7 is in [1, 255]
    let segment = (biased >> 7) as u32;
    let exponent = 31 - segment.leading_zeros();
    let mantissa = ((biased >> (exponent + 3)) & 0x0F) as u8;

    !(sign | ((exponent as u8) << 4) | mantissa)
}

/// Decode one µ-law byte back to a linear sample. Exact inverse of the
/// quantisation performed by [`encode`].
pub fn decode(byte: u8) -> i16 {
    let u = !byte;
    let exponent = i32::from((u >> 4) & 0x07);
    let mantissa = i32::from(u & 0x0F);
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if u & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Width of the quantisation interval the byte was drawn from.
pub fn step_size(byte: u8) -> i32 {
    let exponent = i32::from(((!byte) >> 4) & 0x07);
    1 << (exponent + 3)
}

/// Encode a slice of samples into `out` (cleared first).
pub fn encode_into(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.extend(samples.iter().map(|&s| encode(s)));
}
