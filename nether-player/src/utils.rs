//! Pitch and timing helpers
//!
//! Periods are integers. Linear periods use 64 units per semitone; Amiga
//! periods are stored ×4 so extra-fine slides (a quarter of a fine slide)
//! stay integral. Note 48 with zero finetune plays at the sample's C rate
//! in both modes.

use nether_tracker::{PeriodMode, VibratoWaveform};

/// Linear period of note 0
const LINEAR_BASE: i32 = 10 * 12 * 64;

/// Period of note 48 in either mode
pub const LINEAR_REFERENCE: i32 = LINEAR_BASE - 48 * 64;
pub const AMIGA_REFERENCE: i32 = 428 * 4;

/// ProTracker period range (B-3 .. C-1 in its own notation), ×4
const AMIGA_MIN: i32 = 113 * 4;
const AMIGA_MAX: i32 = 856 * 4;

/// Loose range outside Amiga limits
const PERIOD_MAX: i32 = 0x7FFF * 4;

/// Quarter period steps per unit of a regular slide parameter
pub const SLIDE_UNIT: i32 = 4;

/// 64-point quarter sine for vibrato/tremolo, amplitude 64
/// Values are sin(i * π/128) * 64 for i = 0..63, mirrored to 256 positions
pub const SINE_LUT_64: [i8; 64] = [
    0, 2, 3, 5, 6, 8, 9, 11, 12, 14, 16, 17, 19, 20, 22, 23, 24, 26, 27, 29, 30, 32, 33, 34, 36,
    37, 38, 39, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 56, 57, 58, 59,
    59, 60, 60, 61, 61, 62, 62, 62, 63, 63, 63, 64, 64, 64, 64, 64,
];

/// 2^(i/768) for one octave of linear periods
///
/// Entry 768 is included for interpolation at the boundary.
pub const LINEAR_FREQ_TABLE: [f32; 769] = {
    let mut table = [0.0f32; 769];
    let mut i = 0;
    while i < 769 {
        // e^(x ln 2) by Taylor series; const eval has no powf
        let x = i as f64 / 768.0;
        let t = x * std::f64::consts::LN_2;
        let e_t = 1.0
            + t * (1.0
                + t * (0.5
                    + t * (0.16666666666666666
                        + t * (0.041666666666666664
                            + t * (0.008333333333333333
                                + t * (0.001388888888888889 + t * 0.0001984126984126984))))));
        table[i] = e_t as f32;
        i += 1;
    }
    table
};

/// Calculate samples per tick from tempo
///
/// Tracker timing: samples_per_tick = sample_rate * 2.5 / bpm
pub fn samples_per_tick(tempo: u16, sample_rate: u32) -> u32 {
    if tempo == 0 {
        return sample_rate;
    }
    let samples = u64::from(sample_rate) * 5 / 2 / u64::from(tempo);
    u32::try_from(samples).unwrap_or(u32::MAX)
}

/// Oscillator value at `position` (256 steps per cycle), range -64..=64
pub fn waveform_value(waveform: VibratoWaveform, position: u8) -> i32 {
    match waveform {
        VibratoWaveform::Sine => {
            let idx = (position & 0x3F) as usize;
            let val = match position >> 6 {
                0 => SINE_LUT_64[idx],
                1 => SINE_LUT_64[63 - idx],
                2 => -SINE_LUT_64[idx],
                _ => -SINE_LUT_64[63 - idx],
            };
            val as i32
        }
        VibratoWaveform::RampDown => 64 - (position as i32 >> 1),
        VibratoWaveform::Square => {
            if position < 128 {
                64
            } else {
                -64
            }
        }
        VibratoWaveform::Random => {
            // Deterministic so replays stay identical
            let x = position.wrapping_mul(0x9E) ^ 0x5C;
            (x as i32 >> 1) - 64
        }
    }
}

/// Period of `note` (already transposed by the sample's relative note)
///
/// `finetune` is in 1/128 semitone steps.
pub fn note_period(mode: PeriodMode, note: i16, finetune: i8) -> i32 {
    match mode {
        PeriodMode::Linear => LINEAR_BASE - note as i32 * 64 - finetune as i32 / 2,
        PeriodMode::Amiga => {
            let semitones = (note as f64 - 48.0) + finetune as f64 / 128.0;
            let period = AMIGA_REFERENCE as f64 * (-semitones / 12.0).exp2();
            (period.round() as i32).clamp(1, PERIOD_MAX)
        }
    }
}

/// Keep a period inside the playable range
pub fn clamp_period(mode: PeriodMode, period: i32, amiga_limits: bool) -> i32 {
    match mode {
        PeriodMode::Amiga if amiga_limits => period.clamp(AMIGA_MIN, AMIGA_MAX),
        _ => period.clamp(1, PERIOD_MAX),
    }
}

/// Period shifted by `semitones`
pub fn transpose_period(mode: PeriodMode, period: i32, semitones: i32) -> i32 {
    match mode {
        PeriodMode::Linear => period - semitones * 64,
        PeriodMode::Amiga => {
            let scaled = period as f64 * (-(semitones as f64) / 12.0).exp2();
            (scaled.round() as i32).max(1)
        }
    }
}

/// Round a period to the nearest semitone of a sample tuned by `finetune`
pub fn snap_to_semitone(mode: PeriodMode, period: i32, finetune: i8) -> i32 {
    match mode {
        PeriodMode::Linear => {
            let offset = finetune as i32 / 2;
            let steps = (LINEAR_BASE - offset - period + 32).div_euclid(64);
            LINEAR_BASE - offset - steps * 64
        }
        PeriodMode::Amiga => {
            if period <= 0 {
                return period;
            }
            let semitones = -12.0 * (period as f64 / AMIGA_REFERENCE as f64).log2()
                - finetune as f64 / 128.0;
            note_period(mode, semitones.round() as i16 + 48, finetune)
        }
    }
}

/// Panning 0-64 scaled to 0-255
pub fn pan_from_64(pan: u8) -> u8 {
    (u16::from(pan.min(64)) * 255 / 64) as u8
}

/// 2^(units / 768): pitch ratio of a linear period difference
pub fn pitch_ratio(units: i32) -> f32 {
    let octaves = units.div_euclid(768);
    let frac = units.rem_euclid(768) as usize;
    let scale = if octaves >= 0 {
        (1u32 << octaves.min(31)) as f32
    } else {
        1.0 / (1u32 << (-octaves).min(31)) as f32
    };
    LINEAR_FREQ_TABLE[frac] * scale
}

/// Playback frequency (Hz) of a period for a sample whose note 48 plays at `c_rate`
pub fn period_frequency(mode: PeriodMode, period: i32, c_rate: u32) -> f32 {
    if period <= 0 {
        return 0.0;
    }
    match mode {
        PeriodMode::Linear => c_rate as f32 * pitch_ratio(LINEAR_REFERENCE - period),
        PeriodMode::Amiga => c_rate as f32 * AMIGA_REFERENCE as f32 / period as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_tick() {
        assert_eq!(samples_per_tick(125, 44100), 882);
        assert_eq!(samples_per_tick(125, 22050), 441);
        assert_eq!(samples_per_tick(0, 44100), 44100);
        assert_eq!(samples_per_tick(125, 1_000_000_000), 20_000_000);
        assert_eq!(samples_per_tick(1, u32::MAX), u32::MAX);
    }

    #[test]
    fn test_reference_note_plays_at_c_rate() {
        for mode in [PeriodMode::Linear, PeriodMode::Amiga] {
            let period = note_period(mode, 48, 0);
            let freq = period_frequency(mode, period, 8363);
            assert!((freq - 8363.0).abs() < 0.5, "{:?}: {}", mode, freq);
        }
        assert_eq!(note_period(PeriodMode::Linear, 48, 0), LINEAR_REFERENCE);
        assert_eq!(note_period(PeriodMode::Amiga, 48, 0), AMIGA_REFERENCE);
    }

    #[test]
    fn test_octaves_double_frequency() {
        for mode in [PeriodMode::Linear, PeriodMode::Amiga] {
            let low = period_frequency(mode, note_period(mode, 48, 0), 8000);
            let high = period_frequency(mode, note_period(mode, 60, 0), 8000);
            assert!((high / low - 2.0).abs() < 0.01, "{:?}", mode);
        }
    }

    #[test]
    fn test_finetune_raises_pitch() {
        for mode in [PeriodMode::Linear, PeriodMode::Amiga] {
            assert!(note_period(mode, 48, 64) < note_period(mode, 48, 0));
            assert!(note_period(mode, 48, -64) > note_period(mode, 48, 0));
        }
    }

    #[test]
    fn test_transpose_and_snap() {
        let mode = PeriodMode::Linear;
        assert_eq!(transpose_period(mode, note_period(mode, 48, 0), 7), note_period(mode, 55, 0));
        assert_eq!(snap_to_semitone(mode, note_period(mode, 50, 0) + 20, 0), note_period(mode, 50, 0));

        let mode = PeriodMode::Amiga;
        let c = note_period(mode, 48, 0);
        assert_eq!(transpose_period(mode, c, 12), c / 2);
        assert_eq!(snap_to_semitone(mode, c + 10, 0), c);
    }

    #[test]
    fn test_amiga_limits() {
        assert_eq!(clamp_period(PeriodMode::Amiga, 10, true), AMIGA_MIN);
        assert_eq!(clamp_period(PeriodMode::Amiga, 10, false), 10);
        assert_eq!(clamp_period(PeriodMode::Linear, -5, true), 1);
    }

    #[test]
    fn test_waveforms() {
        use VibratoWaveform::*;
        assert_eq!(waveform_value(Sine, 0), 0);
        assert_eq!(waveform_value(Sine, 64), 64);
        assert_eq!(waveform_value(Sine, 192), -64);
        assert_eq!(waveform_value(Square, 10), 64);
        assert_eq!(waveform_value(Square, 200), -64);
        assert_eq!(waveform_value(RampDown, 0), 64);
        assert_eq!(waveform_value(RampDown, 255), -63);
        for pos in 0..=255u8 {
            assert!((-64..=64).contains(&waveform_value(Random, pos)));
        }
        assert_eq!(waveform_value(Random, 17), waveform_value(Random, 17));
    }

    #[test]
    fn test_pitch_ratio() {
        assert!((pitch_ratio(0) - 1.0).abs() < 1e-6);
        assert!((pitch_ratio(768) - 2.0).abs() < 1e-5);
        assert!((pitch_ratio(-768) - 0.5).abs() < 1e-6);
        assert!((pitch_ratio(384) - std::f32::consts::SQRT_2).abs() < 1e-4);
    }
}
