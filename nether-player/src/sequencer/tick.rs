//! Continuing effects, run on every tick of a row

use nether_tracker::QuirkFlags;

use super::{Ctx, row};
use crate::channel::{ChannelState, VOLUME_MAX, VOLUME_SCALE};
use crate::intent::NoteAction;
use crate::utils::{self, SLIDE_UNIT};

/// Run one tick of the row's effects on a channel
///
/// Effects that only act after the first tick check `tick` themselves.
pub(super) fn process_channel(channel: &mut ChannelState, tick: u16, ctx: &Ctx<'_>) {
    timed_events(channel, tick, ctx);
    update_pitch(channel, tick, ctx);
    update_volume(channel, tick, ctx);
}

/// Note delay, note cut, key off and retrigger
fn timed_events(channel: &mut ChannelState, tick: u16, ctx: &Ctx<'_>) {
    if let Some((delay, event)) = channel.row.note_delay
        && u16::from(delay) == tick
    {
        row::start_event(channel, &event, ctx);
    }

    if channel.row.note_cut.is_some_and(|at| u16::from(at) == tick) {
        channel.cut();
    }
    if channel.row.key_off.is_some_and(|at| u16::from(at) == tick) {
        row::key_off(channel, ctx);
    }

    if let Some((interval, op)) = channel.row.retrigger
        && interval > 0
        && tick > 0
        && tick % u16::from(interval) == 0
        && channel.is_active()
    {
        channel.volume = retrigger_volume(channel.volume, op);
        if channel.action == NoteAction::Unchanged {
            channel.action = NoteAction::Retrigger;
        }
    }
}

/// Volume change of a multi-retrigger (`op` is the high parameter nibble)
fn retrigger_volume(volume: u16, op: u8) -> u16 {
    let v = i32::from(volume);
    let step = i32::from(VOLUME_SCALE);
    let changed = match op {
        0x1..=0x5 => v - (step << (op - 1)),
        0x6 => v * 2 / 3,
        0x7 => v / 2,
        0x9..=0xD => v + (step << (op - 9)),
        0xE => v * 3 / 2,
        0xF => v * 2,
        _ => v,
    };
    changed.clamp(0, i32::from(VOLUME_MAX)) as u16
}

fn update_pitch(channel: &mut ChannelState, tick: u16, ctx: &Ctx<'_>) {
    if channel.period <= 0 {
        channel.output_period = 0;
        return;
    }

    if tick > 0 {
        if let Some(delta) = channel.row.porta {
            channel.period = ctx.clamp_period(channel.period + delta);
        }
        if channel.row.tone_porta {
            tone_porta(channel);
        }
    }

    let mut output = channel.period;
    if channel.glissando && channel.row.tone_porta {
        output = utils::snap_to_semitone(ctx.mode, output, channel.finetune);
    }
    if let Some(param) = channel.row.arpeggio {
        let semitones = match tick % 3 {
            0 => 0,
            1 => param >> 4,
            _ => param & 0x0F,
        };
        output = utils::transpose_period(ctx.mode, output, i32::from(semitones));
    }
    if let Some(divisor) = channel.row.vibrato
        && tick > 0
    {
        let vibrato = &mut channel.vibrato;
        let value = utils::waveform_value(vibrato.waveform, vibrato.position);
        output += value * i32::from(vibrato.depth) / (8 * divisor);
        vibrato.step();
    }
    channel.output_period = ctx.clamp_period(output);
}

/// Slide toward the target period without overshooting
fn tone_porta(channel: &mut ChannelState) {
    let target = channel.target_period;
    if target <= 0 {
        return;
    }
    let speed = i32::from(channel.porta_speed) * SLIDE_UNIT;
    let diff = target - channel.period;
    channel.period = if diff.abs() <= speed {
        target
    } else {
        channel.period + speed * diff.signum()
    };
}

fn update_volume(channel: &mut ChannelState, tick: u16, ctx: &Ctx<'_>) {
    let effects = channel.row;
    if (tick > 0 || ctx.has(QuirkFlags::FAST_VOLUME_SLIDES))
        && let Some(delta) = effects.volume_slide
    {
        channel.slide_volume(delta);
    }
    if tick > 0 {
        if let Some(delta) = effects.volume_column_slide {
            channel.slide_volume(delta);
        }
        if let Some(delta) = effects.channel_volume_slide {
            channel.slide_channel_volume(delta);
        }
        if let Some(delta) = effects.pan_slide {
            channel.slide_pan(delta);
        }
    }

    let mut volume = i32::from(channel.volume);
    if effects.tremolo && tick > 0 {
        let tremolo = &mut channel.tremolo;
        volume += utils::waveform_value(tremolo.waveform, tremolo.position) * i32::from(tremolo.depth);
        tremolo.step();
    }
    if effects.tremor {
        let tremor = &mut channel.tremor;
        let cycle = tremor.on_ticks.saturating_add(tremor.off_ticks).max(1);
        tremor.muted = tremor.counter % cycle >= tremor.on_ticks;
        tremor.counter = (tremor.counter + 1) % cycle;
    }
    if channel.tremor.muted {
        volume = 0;
    }
    channel.output_volume = volume.clamp(0, i32::from(VOLUME_MAX)) as u16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrigger_volume_ops() {
        assert_eq!(retrigger_volume(512, 0), 512);
        assert_eq!(retrigger_volume(512, 0x1), 512 - 16);
        assert_eq!(retrigger_volume(512, 0x5), 512 - 256);
        assert_eq!(retrigger_volume(512, 0x7), 256);
        assert_eq!(retrigger_volume(512, 0x6), 341);
        assert_eq!(retrigger_volume(512, 0xA), 512 + 32);
        assert_eq!(retrigger_volume(900, 0xF), VOLUME_MAX);
        assert_eq!(retrigger_volume(10, 0x5), 0);
    }

    #[test]
    fn test_tone_porta_stops_at_target() {
        let mut channel = ChannelState::new(0, 128, 64);
        channel.period = 1000;
        channel.target_period = 990;
        channel.porta_speed = 2;
        tone_porta(&mut channel);
        assert_eq!(channel.period, 992);
        tone_porta(&mut channel);
        assert_eq!(channel.period, 990);
        tone_porta(&mut channel);
        assert_eq!(channel.period, 990);
    }
}
