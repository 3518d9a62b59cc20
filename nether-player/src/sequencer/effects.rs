//! Effect registration on the first tick of a row
//!
//! One-off effects (fine slides, set volume, offsets) act here. Continuing
//! effects only record their parameters in [`RowEffects`] and run from the
//! tick pass. Song-wide effects land in [`RowGlobals`].
//!
//! [`RowEffects`]: crate::channel::RowEffects

use nether_tracker::{Effect, Event, Note, QuirkFlags};

use super::{Ctx, RowGlobals};
use crate::channel::{ChannelState, LoopState, Slot, VOLUME_SCALE};
use crate::utils::{self, SLIDE_UNIT};

/// Fine or regular reading of an `xy` slide parameter
enum Slide {
    /// Per-tick change after the first tick
    Regular(i32),
    /// One-off change on the first tick
    Fine(i32),
}

/// Decode a volume-style `xy` slide: x raises, y lowers
///
/// Under combined fine slides `xF` and `Fy` are fine slides.
fn decode_slide(param: u8, combined: bool) -> Slide {
    let (up, down) = (i32::from(param >> 4), i32::from(param & 0x0F));
    if combined {
        if down == 0x0F && up != 0 {
            return Slide::Fine(up);
        }
        if up == 0x0F && down != 0 {
            return Slide::Fine(-down);
        }
    }
    if up != 0 {
        Slide::Regular(up)
    } else {
        Slide::Regular(-down)
    }
}

/// Register one effect column entry
pub(super) fn register(
    channel: &mut ChannelState,
    globals: &mut RowGlobals,
    shared_loop: &mut LoopState,
    effect: Effect,
    event: &Event,
    ctx: &Ctx<'_>,
) {
    let scope = ctx.quirks.effect_memory;
    let combined = ctx.has(QuirkFlags::COMBINED_FINE_SLIDES);

    match effect {
        Effect::None | Effect::NoteDelay(_) => {}

        // Pitch
        Effect::Arpeggio(param) => {
            let param = channel.memory.recall(scope, Slot::Arpeggio, param);
            if param != 0 {
                channel.row.arpeggio = Some(param);
            }
        }
        Effect::PortaUp(param) => {
            let param = channel.memory.recall(scope, Slot::PortaUp, param);
            pitch_slide(channel, param, -1, combined, ctx);
        }
        Effect::PortaDown(param) => {
            let param = channel.memory.recall(scope, Slot::PortaDown, param);
            pitch_slide(channel, param, 1, combined, ctx);
        }
        Effect::FinePortaUp(x) => shift_period(channel, -i32::from(x) * SLIDE_UNIT, ctx),
        Effect::FinePortaDown(x) => shift_period(channel, i32::from(x) * SLIDE_UNIT, ctx),
        Effect::ExtraFinePortaUp(x) => shift_period(channel, -i32::from(x), ctx),
        Effect::ExtraFinePortaDown(x) => shift_period(channel, i32::from(x), ctx),
        Effect::TonePorta(param) => {
            channel.porta_speed = channel.memory.recall(scope, Slot::TonePorta, param);
            channel.row.tone_porta = true;
        }
        Effect::TonePortaVolSlide(param) => {
            channel.row.tone_porta = true;
            volume_slide(channel, param, combined, ctx);
        }
        Effect::Vibrato(param) => {
            channel.vibrato.set_params(param);
            channel.row.vibrato = Some(1);
        }
        Effect::FineVibrato(param) => {
            channel.vibrato.set_params(param);
            channel.row.vibrato = Some(4);
        }
        Effect::VibratoVolSlide(param) => {
            channel.row.vibrato = Some(1);
            volume_slide(channel, param, combined, ctx);
        }
        Effect::VibratoWaveform(selector) => channel.vibrato.set_waveform(selector),
        Effect::Glissando(on) => channel.glissando = on,
        Effect::SetFinetune(nibble) => {
            // Signed nibble in eighths of a semitone
            let eighths = ((nibble << 4) as i8) >> 4;
            channel.finetune = eighths.saturating_mul(16);
            if let Note::On(note) = event.note
                && !event.has_tone_porta()
            {
                let played = channel.played_note.unwrap_or(note);
                let period = ctx.clamp_period(utils::note_period(
                    ctx.mode,
                    i16::from(played) + i16::from(channel.relative_note),
                    channel.finetune,
                ));
                channel.base_period = period;
                channel.period = period;
                channel.output_period = period;
            }
        }

        // Volume
        Effect::SetVolume(volume) => channel.set_volume(volume),
        Effect::VolumeSlide(param) => volume_slide(channel, param, combined, ctx),
        Effect::FineVolumeSlideUp(x) => {
            channel.slide_volume(i32::from(x) * i32::from(VOLUME_SCALE));
        }
        Effect::FineVolumeSlideDown(x) => {
            channel.slide_volume(-i32::from(x) * i32::from(VOLUME_SCALE));
        }
        Effect::Tremolo(param) => {
            channel.tremolo.set_params(param);
            channel.row.tremolo = true;
        }
        Effect::TremoloWaveform(selector) => channel.tremolo.set_waveform(selector),
        Effect::Tremor(param) => {
            let param = channel.memory.recall(scope, Slot::Tremor, param);
            channel.tremor.on_ticks = (param >> 4) + 1;
            channel.tremor.off_ticks = (param & 0x0F) + 1;
            channel.row.tremor = true;
        }
        Effect::ChannelVolume(volume) => channel.channel_volume = volume.min(64),
        Effect::ChannelVolumeSlide(param) => {
            let param = channel.memory.recall(scope, Slot::ChannelVolumeSlide, param);
            match decode_slide(param, combined) {
                Slide::Regular(delta) => channel.row.channel_volume_slide = Some(delta),
                Slide::Fine(delta) => channel.slide_channel_volume(delta),
            }
        }
        Effect::GlobalVolume(volume) => globals.global_volume = Some(volume),
        Effect::GlobalVolumeSlide(param) => {
            let param = channel.memory.recall(scope, Slot::GlobalVolumeSlide, param);
            // 0-64 global volume ranges step twice as fast on the 0-128 scale
            let unit = if combined { 1 } else { 2 };
            match decode_slide(param, combined) {
                Slide::Regular(delta) => globals.global_volume_slide = Some(delta * unit),
                Slide::Fine(delta) => globals.global_volume_fine += delta * unit,
            }
        }

        // Panning
        Effect::SetPan(pan) => channel.pan = pan,
        Effect::PanSlide(param) => {
            let param = channel.memory.recall(scope, Slot::PanSlide, param);
            // 0-64 pan ranges step four units on the 0-255 scale
            let unit = if combined { 4 } else { 1 };
            match decode_slide(param, combined) {
                Slide::Regular(delta) => channel.row.pan_slide = Some(delta * unit),
                Slide::Fine(delta) => channel.slide_pan(delta * unit),
            }
        }

        // Sample control
        Effect::SampleOffset(param) => {
            let param = channel.memory.recall(scope, Slot::SampleOffset, param);
            channel.sample_offset =
                Some(u32::from(param) * 256 + u32::from(channel.offset_high) * 65536);
        }
        Effect::SampleOffsetHigh(high) => channel.offset_high = high,
        Effect::Retrigger(interval) => {
            let interval = channel.memory.recall(scope, Slot::Retrigger, interval);
            channel.row.retrigger = Some((interval & 0x0F, 0));
        }
        Effect::MultiRetrigger(param) => {
            let param = channel.memory.recall(scope, Slot::Retrigger, param);
            channel.row.retrigger = Some((param & 0x0F, param >> 4));
        }
        Effect::NoteCut(tick) => channel.row.note_cut = Some(tick),
        Effect::KeyOff(tick) => channel.row.key_off = Some(tick),
        Effect::SetEnvelopePosition(tick) => channel.envelopes.position = Some(u16::from(tick)),
        Effect::PastNote(action) => channel.past_note = Some(action),
        Effect::SetNewNoteAction(nna) => channel.nna = nna,
        Effect::Envelope(toggle) => channel.envelopes.toggle = Some(toggle),

        // Song flow and timing
        Effect::SetSpeed(speed) => {
            if speed > 0 {
                globals.speed = Some(speed);
            }
        }
        Effect::SetTempo(tempo) => globals.tempo = Some(tempo),
        Effect::TempoSlide(param) => {
            let param = channel.memory.recall(scope, Slot::TempoSlide, param);
            let amount = i32::from(param & 0x0F);
            globals.tempo_slide = Some(if param >> 4 == 0 { -amount } else { amount });
        }
        Effect::PositionJump(order) => globals.jump_order = Some(u16::from(order)),
        Effect::PatternBreak(row) => globals.break_row = Some(u16::from(row)),
        Effect::PatternLoop(count) => {
            let state = if ctx.has(QuirkFlags::GLOBAL_PATTERN_LOOP) {
                shared_loop
            } else {
                &mut channel.loop_state
            };
            pattern_loop(state, count, globals, ctx.row);
        }
        Effect::PatternDelay(rows) => {
            if globals.pattern_delay.is_none() {
                globals.pattern_delay = Some(rows);
            }
        }
        Effect::FinePatternDelay(ticks) => {
            globals.fine_delay = globals.fine_delay.saturating_add(ticks);
        }
    }
}

fn pattern_loop(state: &mut LoopState, count: u8, globals: &mut RowGlobals, row: u16) {
    if count == 0 {
        state.row = row;
    } else if state.count == 0 {
        state.count = count;
        globals.loop_row = Some(state.row);
    } else {
        state.count -= 1;
        if state.count > 0 {
            globals.loop_row = Some(state.row);
        }
    }
}

/// Portamento up (`direction` -1) or down (+1)
fn pitch_slide(channel: &mut ChannelState, param: u8, direction: i32, combined: bool, ctx: &Ctx<'_>) {
    let amount = i32::from(param & 0x0F);
    match param >> 4 {
        0xF if combined => shift_period(channel, direction * amount * SLIDE_UNIT, ctx),
        0xE if combined => shift_period(channel, direction * amount, ctx),
        _ => channel.row.porta = Some(direction * i32::from(param) * SLIDE_UNIT),
    }
}

fn shift_period(channel: &mut ChannelState, delta: i32, ctx: &Ctx<'_>) {
    if channel.period <= 0 {
        return;
    }
    channel.period = ctx.clamp_period(channel.period + delta);
    channel.output_period = channel.period;
}

fn volume_slide(channel: &mut ChannelState, param: u8, combined: bool, ctx: &Ctx<'_>) {
    let param = channel
        .memory
        .recall(ctx.quirks.effect_memory, Slot::VolumeSlide, param);
    let scale = i32::from(VOLUME_SCALE);
    match decode_slide(param, combined) {
        Slide::Regular(delta) => channel.row.volume_slide = Some(delta * scale),
        Slide::Fine(delta) => channel.slide_volume(delta * scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_slide() {
        assert!(matches!(decode_slide(0x30, false), Slide::Regular(3)));
        assert!(matches!(decode_slide(0x04, false), Slide::Regular(-4)));
        assert!(matches!(decode_slide(0x3F, false), Slide::Regular(3)));
        assert!(matches!(decode_slide(0x3F, true), Slide::Fine(3)));
        assert!(matches!(decode_slide(0xF2, true), Slide::Fine(-2)));
        assert!(matches!(decode_slide(0xFF, true), Slide::Fine(15)));
        assert!(matches!(decode_slide(0x0F, true), Slide::Regular(-15)));
    }

    #[test]
    fn test_pattern_loop_repeats_count_times() {
        let mut state = LoopState::default();
        let mut globals = RowGlobals::default();
        pattern_loop(&mut state, 0, &mut globals, 4);
        assert_eq!(state.row, 4);

        let mut jumps = 0;
        for _ in 0..5 {
            let mut globals = RowGlobals::default();
            pattern_loop(&mut state, 2, &mut globals, 7);
            if globals.loop_row == Some(4) {
                jumps += 1;
            } else {
                break;
            }
        }
        assert_eq!(jumps, 2);
        assert_eq!(state.count, 0);
    }
}
