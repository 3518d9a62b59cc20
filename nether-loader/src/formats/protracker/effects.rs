//! ProTracker effect conversion
//!
//! Covers the MOD effect set (0-F) and the FastTracker 2 letters built on it
//! (G-X), which share the same numbering in XM files.

use nether_tracker::Effect;

// XM effect numbers beyond the ProTracker range
const XM_GLOBAL_VOLUME: u8 = 16; // G
const XM_GLOBAL_VOLUME_SLIDE: u8 = 17; // H
const XM_KEY_OFF: u8 = 20; // K
const XM_ENVELOPE_POSITION: u8 = 21; // L
const XM_PAN_SLIDE: u8 = 25; // P
const XM_MULTI_RETRIG: u8 = 27; // R
const XM_TREMOR: u8 = 29; // T
const XM_EXTRA_FINE_PORTA: u8 = 33; // X

/// Convert a ProTracker/XM effect command
///
/// Returns `Err` with a feature name for commands the engine leaves inert.
pub(crate) fn convert(fx: u8, param: u8) -> Result<Effect, &'static str> {
    let hi = param >> 4;
    let lo = param & 0x0F;

    let effect = match fx {
        0x0 if param == 0 => Effect::None,
        0x0 => Effect::Arpeggio(param),
        0x1 => Effect::PortaUp(param),
        0x2 => Effect::PortaDown(param),
        0x3 => Effect::TonePorta(param),
        0x4 => Effect::Vibrato(param),
        0x5 => Effect::TonePortaVolSlide(param),
        0x6 => Effect::VibratoVolSlide(param),
        0x7 => Effect::Tremolo(param),
        0x8 => Effect::SetPan(param),
        0x9 => Effect::SampleOffset(param),
        0xA => Effect::VolumeSlide(param),
        0xB => Effect::PositionJump(param),
        0xC => Effect::SetVolume(param.min(64)),
        // Decimal row number stored as two BCD digits
        0xD => Effect::PatternBreak(hi * 10 + lo),
        0xE => return convert_extended(hi, lo),
        0xF if param == 0 => Effect::None,
        0xF if param < 0x20 => Effect::SetSpeed(param),
        0xF => Effect::SetTempo(param),
        XM_GLOBAL_VOLUME => Effect::GlobalVolume(param.min(64) * 2),
        XM_GLOBAL_VOLUME_SLIDE => Effect::GlobalVolumeSlide(param),
        XM_KEY_OFF => Effect::KeyOff(param),
        XM_ENVELOPE_POSITION => Effect::SetEnvelopePosition(param),
        XM_PAN_SLIDE => Effect::PanSlide(param),
        XM_MULTI_RETRIG => Effect::MultiRetrigger(param),
        XM_TREMOR => Effect::Tremor(param),
        XM_EXTRA_FINE_PORTA => match hi {
            1 => Effect::ExtraFinePortaUp(lo),
            2 => Effect::ExtraFinePortaDown(lo),
            _ => Effect::None,
        },
        _ => return Err("unknown effect command"),
    };
    Ok(effect)
}

/// ProTracker Exy commands
fn convert_extended(command: u8, value: u8) -> Result<Effect, &'static str> {
    let effect = match command {
        0x0 => return Err("Amiga filter control"),
        0x1 => Effect::FinePortaUp(value),
        0x2 => Effect::FinePortaDown(value),
        0x3 => Effect::Glissando(value != 0),
        0x4 => Effect::VibratoWaveform(value),
        0x5 => Effect::SetFinetune(value),
        0x6 => Effect::PatternLoop(value),
        0x7 => Effect::TremoloWaveform(value),
        0x8 => Effect::SetPan(value * 17),
        0x9 => Effect::Retrigger(value),
        0xA => Effect::FineVolumeSlideUp(value),
        0xB => Effect::FineVolumeSlideDown(value),
        0xC => Effect::NoteCut(value),
        0xD => Effect::NoteDelay(value),
        0xE => Effect::PatternDelay(value),
        _ => return Err("invert loop"),
    };
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_tempo_split() {
        assert_eq!(convert(0xF, 0x06), Ok(Effect::SetSpeed(6)));
        assert_eq!(convert(0xF, 0x1F), Ok(Effect::SetSpeed(31)));
        assert_eq!(convert(0xF, 0x20), Ok(Effect::SetTempo(32)));
        assert_eq!(convert(0xF, 0x00), Ok(Effect::None));
    }

    #[test]
    fn test_pattern_break_is_decimal() {
        assert_eq!(convert(0xD, 0x16), Ok(Effect::PatternBreak(16)));
        assert_eq!(convert(0xD, 0x00), Ok(Effect::PatternBreak(0)));
    }

    #[test]
    fn test_extended_commands() {
        assert_eq!(convert(0xE, 0x1F), Ok(Effect::FinePortaUp(15)));
        assert_eq!(convert(0xE, 0xD3), Ok(Effect::NoteDelay(3)));
        assert_eq!(convert(0xE, 0x8F), Ok(Effect::SetPan(255)));
        assert!(convert(0xE, 0x01).is_err());
    }

    #[test]
    fn test_xm_letters() {
        assert_eq!(convert(XM_GLOBAL_VOLUME, 0x40), Ok(Effect::GlobalVolume(128)));
        assert_eq!(convert(XM_EXTRA_FINE_PORTA, 0x13), Ok(Effect::ExtraFinePortaUp(3)));
        assert_eq!(convert(XM_KEY_OFF, 2), Ok(Effect::KeyOff(2)));
        assert!(convert(40, 0).is_err());
    }
}
