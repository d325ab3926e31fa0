// src/util.rs

//! Small numeric helpers shared by the engine and the parameter layer.

/// Linear map of `x` from `[in_min, in_max]` to `[out_min, out_max]`.
#[inline]
pub fn linlin(x: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    if (in_max - in_min).abs() < f32::EPSILON {
        return out_min;
    }
    (x - in_min) / (in_max - in_min) * (out_max - out_min) + out_min
}

/// Decibels to linear amplitude.
#[inline]
pub fn db_to_amp(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Linear amplitude to decibels, floored at -100 dB so silence never becomes
/// negative infinity.
#[inline]
pub fn amp_to_db(amp: f32) -> f32 {
    const MIN_AMP: f32 = 1.0e-6;
    if amp < MIN_AMP {
        return -100.0;
    }
    20.0 * amp.log10()
}

/// MIDI note number to frequency in Hz (A4 = 69 = 440 Hz).
#[inline]
pub fn midi_to_freq(midi: f32) -> f32 {
    440.0 * 2.0f32.powf((midi - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linlin_maps_endpoints() {
        assert_eq!(linlin(0.0, 0.0, 1.0, -1.0, 1.0), -1.0);
        assert_eq!(linlin(1.0, 0.0, 1.0, -1.0, 1.0), 1.0);
        assert_eq!(linlin(0.5, 0.0, 1.0, 0.0, 10.0), 5.0);
    }

    #[test]
    fn amp_db_round_trip() {
        let amp = db_to_amp(-6.0);
        assert!((amp_to_db(amp) + 6.0).abs() < 1e-4);
    }

    #[test]
    fn amp_to_db_floors_silence() {
        assert_eq!(amp_to_db(0.0), -100.0);
        assert_eq!(amp_to_db(1.0e-9), -100.0);
    }

    #[test]
    fn midi_to_freq_a4() {
        assert!((midi_to_freq(69.0) - 440.0).abs() < 1e-3);
    }
}
