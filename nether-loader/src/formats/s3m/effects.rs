//! Scream Tracker 3 / Impulse Tracker effect conversion
//!
//! Both formats number effects A=1 .. Z=26. They differ in parameter ranges
//! for a few letters (pattern break digits, pan and global volume scale).

use nether_tracker::{Effect, EnvelopeToggle, NewNoteAction, PastNoteAction};

/// Which tracker's parameter conventions apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    S3m,
    It,
}

/// Convert a lettered effect command
///
/// Returns `Err` with a feature name for commands the engine leaves inert.
pub(crate) fn convert(command: u8, param: u8, flavor: Flavor) -> Result<Effect, &'static str> {
    let hi = param >> 4;
    let lo = param & 0x0F;

    let effect = match command {
        0 => Effect::None,
        1 if param == 0 => Effect::None, // A
        1 => Effect::SetSpeed(param),
        2 => Effect::PositionJump(param), // B
        3 => Effect::PatternBreak(match flavor {
            // C: ST3 stores the row as two decimal digits
            Flavor::S3m => hi * 10 + lo,
            Flavor::It => param,
        }),
        4 => Effect::VolumeSlide(param),  // D
        5 => Effect::PortaDown(param),    // E
        6 => Effect::PortaUp(param),      // F
        7 => Effect::TonePorta(param),    // G
        8 => Effect::Vibrato(param),      // H
        9 => Effect::Tremor(param),       // I
        10 => Effect::Arpeggio(param),    // J
        11 => Effect::VibratoVolSlide(param),   // K
        12 => Effect::TonePortaVolSlide(param), // L
        13 => Effect::ChannelVolume(param.min(64)), // M
        14 => Effect::ChannelVolumeSlide(param),    // N
        15 => Effect::SampleOffset(param),          // O
        16 => Effect::PanSlide(param),              // P
        17 => Effect::MultiRetrigger(param),        // Q
        18 => Effect::Tremolo(param),               // R
        19 => return convert_special(hi, lo),       // S
        20 if param < 0x20 => Effect::TempoSlide(param), // T
        20 => Effect::SetTempo(param),
        21 => Effect::FineVibrato(param), // U
        22 => Effect::GlobalVolume(match flavor {
            // V
            Flavor::S3m => param.min(64) * 2,
            Flavor::It => param.min(128),
        }),
        23 => Effect::GlobalVolumeSlide(param), // W
        24 => Effect::SetPan(match flavor {
            // X: ST3 uses 0-128 (0xA4 = surround), IT uses 0-255
            Flavor::S3m if param > 0x80 => return Err("surround panning"),
            Flavor::S3m => (u16::from(param) * 255 / 128) as u8,
            Flavor::It => param,
        }),
        25 => return Err("panbrello"),  // Y
        26 => return Err("MIDI macros"), // Z
        _ => return Err("unknown effect command"),
    };
    Ok(effect)
}

/// Sxy commands
fn convert_special(command: u8, value: u8) -> Result<Effect, &'static str> {
    let effect = match command {
        0x0 => return Err("filter control"),
        0x1 => Effect::Glissando(value != 0),
        0x2 => Effect::SetFinetune(value),
        0x3 => Effect::VibratoWaveform(value),
        0x4 => Effect::TremoloWaveform(value),
        0x5 => return Err("panbrello waveform"),
        0x6 => Effect::FinePatternDelay(value),
        0x7 => match value {
            0 => Effect::PastNote(PastNoteAction::Cut),
            1 => Effect::PastNote(PastNoteAction::Off),
            2 => Effect::PastNote(PastNoteAction::Fade),
            3 => Effect::SetNewNoteAction(NewNoteAction::Cut),
            4 => Effect::SetNewNoteAction(NewNoteAction::Continue),
            5 => Effect::SetNewNoteAction(NewNoteAction::NoteOff),
            6 => Effect::SetNewNoteAction(NewNoteAction::NoteFade),
            7 => Effect::Envelope(EnvelopeToggle::VolumeOff),
            8 => Effect::Envelope(EnvelopeToggle::VolumeOn),
            9 => Effect::Envelope(EnvelopeToggle::PanOff),
            10 => Effect::Envelope(EnvelopeToggle::PanOn),
            11 => Effect::Envelope(EnvelopeToggle::PitchOff),
            12 => Effect::Envelope(EnvelopeToggle::PitchOn),
            _ => Effect::None,
        },
        0x8 => Effect::SetPan(value * 17),
        0x9 => return Err("surround / sound control"),
        0xA => Effect::SampleOffsetHigh(value),
        0xB => Effect::PatternLoop(value),
        0xC => Effect::NoteCut(value),
        0xD => Effect::NoteDelay(value),
        0xE => Effect::PatternDelay(value),
        _ => return Err("MIDI macros"),
    };
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_break_flavors() {
        assert_eq!(convert(3, 0x12, Flavor::S3m), Ok(Effect::PatternBreak(12)));
        assert_eq!(convert(3, 0x12, Flavor::It), Ok(Effect::PatternBreak(0x12)));
    }

    #[test]
    fn test_slides_keep_raw_parameter() {
        assert_eq!(convert(4, 0xF1, Flavor::S3m), Ok(Effect::VolumeSlide(0xF1)));
        assert_eq!(convert(5, 0xE3, Flavor::It), Ok(Effect::PortaDown(0xE3)));
        assert_eq!(convert(6, 0x00, Flavor::It), Ok(Effect::PortaUp(0)));
    }

    #[test]
    fn test_tempo_and_tempo_slide() {
        assert_eq!(convert(20, 0x10, Flavor::It), Ok(Effect::TempoSlide(0x10)));
        assert_eq!(convert(20, 0x80, Flavor::It), Ok(Effect::SetTempo(0x80)));
    }

    #[test]
    fn test_special_commands() {
        assert_eq!(
            convert(19, 0x73, Flavor::It),
            Ok(Effect::SetNewNoteAction(NewNoteAction::Cut))
        );
        assert_eq!(convert(19, 0xB0, Flavor::It), Ok(Effect::PatternLoop(0)));
        assert_eq!(convert(19, 0xA1, Flavor::It), Ok(Effect::SampleOffsetHigh(1)));
        assert_eq!(convert(19, 0xF0, Flavor::It), Err("MIDI macros"));
    }

    #[test]
    fn test_pan_scaling() {
        assert_eq!(convert(24, 0x80, Flavor::S3m), Ok(Effect::SetPan(255)));
        assert_eq!(convert(24, 0xA4, Flavor::S3m), Err("surround panning"));
        assert_eq!(convert(24, 0x80, Flavor::It), Ok(Effect::SetPan(0x80)));
        assert_eq!(convert(22, 0x40, Flavor::S3m), Ok(Effect::GlobalVolume(128)));
    }
}
