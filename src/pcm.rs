//! Conversion between 16-bit PCM and the floating point range the filter works in.

/// Scale between `i16` samples and `[-1, 1]`.
pub const PCM16_SCALE: f64 = 32767.0;

/// Samples re-quantized to 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    pub samples: Vec<i16>,
    /// How many values fell outside the representable range (or were not finite)
    /// and were clipped.
    pub clipped: usize,
}

/// Divides each sample by 32767.
pub fn normalize_i16(samples: &[i16]) -> Vec<f64> {
    samples.iter().map(|&s| s as f64 / PCM16_SCALE).collect()
}

/// Multiplies by 32767, rounds to nearest and saturates to the `i16` range.
/// Non-finite values become 0.
pub fn quantize_i16(samples: &[f64]) -> Quantized {
    let mut clipped = 0;
    let out = samples
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                clipped += 1;
                return 0;
            }
            let v = (s * PCM16_SCALE).round();
            if v > i16::MAX as f64 || v < i16::MIN as f64 {
                clipped += 1;
            }
            v.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect();
    if clipped > 0 {
        tracing::warn!(clipped, total = samples.len(), "samples clipped to 16-bit range");
    }
    Quantized {
        samples: out,
        clipped,
    }
}
