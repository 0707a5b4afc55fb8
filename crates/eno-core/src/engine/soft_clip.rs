//! Soft-clip mixer: merges two PCM samples without hard digital clipping
//!
//! The sum of both inputs is normalized to full scale and passed through a
//! cubic curve `y = 1.1x - 0.2x³`. Beyond ±1.25 (where the curve would start
//! folding back) the output is pinned to ±0.984375.
//!
//! Properties:
//! - Stateless, no locking; safe to call from the audio thread
//! - Symmetric in its arguments
//! - Output always fits in i16, even when both inputs are at full scale
//! - Mild harmonic distortion near full scale is part of the sound

use crate::types::Sample;

/// Full-scale divisor used to normalize the summed samples
const FULL_SCALE: f32 = 0x7fff as f32;

/// Normalized magnitude at which the curve is replaced by the ceiling
const KNEE: f32 = 1.25;

/// Output ceiling once the knee is passed (63/64 of full scale)
const CEILING: f32 = 0.984_375;

/// Combine two samples with cubic soft clipping
///
/// Truncates toward zero on the way back to 16-bit.
#[inline]
pub fn mix(a: Sample, b: Sample) -> Sample {
    let v = (a as f32 + b as f32) / FULL_SCALE;
    let v = if v <= -KNEE {
        -CEILING
    } else if v >= KNEE {
        CEILING
    } else {
        1.1 * v - 0.2 * v * v * v
    };
    (v * FULL_SCALE) as Sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_silence() {
        assert_eq!(mix(0, 0), 0);
    }

    #[test]
    fn test_symmetric() {
        for a in (i16::MIN..=i16::MAX).step_by(251) {
            for b in (i16::MIN..=i16::MAX).step_by(257) {
                assert_eq!(mix(a, b), mix(b, a), "mix({}, {}) not symmetric", a, b);
            }
        }
    }

    #[test]
    fn test_bounded_at_extremes() {
        let ceiling = (CEILING * FULL_SCALE) as i16;
        assert_eq!(mix(i16::MAX, i16::MAX), ceiling);
        assert_eq!(mix(i16::MIN, i16::MIN), -ceiling);
        assert_eq!(mix(i16::MAX, i16::MIN), mix(-1, 0));

        // Sweep the whole input plane: result never leaves the ceiling band
        for a in (i16::MIN..=i16::MAX).step_by(127) {
            for b in (i16::MIN..=i16::MAX).step_by(131) {
                let y = mix(a, b) as i32;
                assert!(
                    y.abs() <= ceiling as i32,
                    "mix({}, {}) = {} exceeds ceiling {}",
                    a, b, y, ceiling
                );
            }
        }
    }

    #[test]
    fn test_curve_values() {
        // x = 0.5 -> 1.1*0.5 - 0.2*0.125 = 0.525
        let half = 16384;
        let x = half as f32 / FULL_SCALE;
        let expected = ((1.1 * x - 0.2 * x * x * x) * FULL_SCALE) as i16;
        assert_eq!(mix(half, 0), expected);
        assert!((mix(half, 0) as f32 / FULL_SCALE - 0.525).abs() < 1e-3);

        // Small signals are boosted by ~10% (curve slope at zero is 1.1);
        // the cubic term keeps the result just under 110, truncated to 109
        assert_eq!(mix(100, 0), 109);
        assert_eq!(mix(-100, 0), -109);
    }

    #[test]
    fn test_monotonic_below_knee() {
        let mut prev = mix(i16::MIN, 0);
        for a in (i16::MIN..=i16::MAX).step_by(64) {
            let y = mix(a, 0);
            assert!(y >= prev, "curve not monotonic at {}: {} < {}", a, y, prev);
            prev = y;
        }
    }
}
