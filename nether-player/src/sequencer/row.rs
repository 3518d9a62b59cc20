//! Row boundary: note and instrument resolution, volume column

use tracing::trace;

use nether_tracker::{
    Effect, Event, InstrumentChange, InstrumentId, InvalidInstrument, Note, OffsetBeyondEnd,
    QuirkFlags, Quirks, SubInstrument, VolumeColumn,
};

use super::{Ctx, Sequencer, effects};
use crate::channel::{ChannelState, ChannelStatus, Slot, VOLUME_SCALE};
use crate::intent::NoteAction;
use crate::utils::{self, SLIDE_UNIT};

/// IT volume column tone portamento speeds (193-202)
const IT_PORTA_SPEEDS: [u8; 10] = [0, 1, 4, 8, 16, 32, 64, 96, 128, 255];

impl Sequencer {
    /// Read the current row on every channel
    pub(super) fn process_row(&mut self, ctx: &Ctx<'_>) {
        self.globals = Default::default();
        let pattern = ctx
            .module
            .pattern_at_order(self.position.order)
            .map(|(_, pattern)| pattern);

        for index in 0..self.channels.len() {
            let channel = &mut self.channels[index];
            channel.reset_row_effects();

            let Some(event) = pattern.and_then(|p| p.event(ctx.row, index as u8)).copied() else {
                continue;
            };
            if event.is_empty() {
                continue;
            }

            let delay = event.effects.iter().find_map(|effect| match effect {
                Effect::NoteDelay(ticks) if *ticks > 0 => Some(*ticks),
                _ => None,
            });
            match delay {
                Some(ticks) => channel.row.note_delay = Some((ticks, event)),
                None => {
                    resolve_note(channel, &event, ctx);
                    apply_volume_column(channel, &event, ctx);
                }
            }

            for effect in event.effects {
                effects::register(
                    channel,
                    &mut self.globals,
                    &mut self.shared_loop,
                    effect,
                    &event,
                    ctx,
                );
            }

            if delay.is_none() {
                finish_trigger(channel, ctx);
            }
        }
    }
}

/// Play the note part of an event (row start, or the tick of a note delay)
pub(super) fn start_event(channel: &mut ChannelState, event: &Event, ctx: &Ctx<'_>) {
    resolve_note(channel, event, ctx);
    apply_volume_column(channel, event, ctx);
    finish_trigger(channel, ctx);
}

/// Dispatch the note and instrument columns
pub(super) fn resolve_note(channel: &mut ChannelState, event: &Event, ctx: &Ctx<'_>) {
    match event.note {
        Note::On(note) if is_porta(event, ctx.quirks) && channel.is_active() => {
            porta_to(channel, note, event.instrument, ctx);
        }
        Note::On(note) => trigger(channel, note, event.instrument, ctx),
        Note::None => {
            if let Some(id) = event.instrument {
                instrument_only(channel, id, ctx);
            }
        }
        Note::Off => key_off(channel, ctx),
        Note::Cut => channel.cut(),
        Note::Fade => channel.fade(),
    }
}

/// Whether the row's note becomes a slide target
fn is_porta(event: &Event, quirks: &Quirks) -> bool {
    if event.has_tone_porta() {
        return true;
    }
    match (quirks.volume_column, event.volume) {
        (VolumeColumn::Xm, Some(raw)) => raw >= 0xF0,
        (VolumeColumn::It, Some(raw)) => (193..=202).contains(&raw),
        _ => false,
    }
}

/// Sub-instrument an instrument plays `note` with, falling back to its first usable one
fn sub_for<'a>(
    instrument: &'a nether_tracker::Instrument,
    note: Option<u8>,
) -> Option<&'a SubInstrument> {
    note.and_then(|note| instrument.resolve(note))
        .and_then(|(sub, _)| instrument.subinstruments.get(sub))
        .or_else(|| instrument.primary_sub())
}

/// Period of `note` played through the channel's instrument
fn target_period(channel: &ChannelState, note: u8, ctx: &Ctx<'_>) -> i32 {
    let mapped = channel
        .instrument
        .and_then(|id| ctx.module.instrument(id))
        .and_then(|ins| {
            let (sub, played) = ins.resolve(note)?;
            ins.subinstruments.get(sub).map(|sub| (played, sub.relative_note, sub.finetune))
        });
    let (played, relative, finetune) =
        mapped.unwrap_or((note, channel.relative_note, channel.finetune));
    ctx.clamp_period(utils::note_period(
        ctx.mode,
        i16::from(played) + i16::from(relative),
        finetune,
    ))
}

/// Note with tone portamento on a sounding channel: slide, don't retrigger
fn porta_to(channel: &mut ChannelState, note: u8, column: Option<InstrumentId>, ctx: &Ctx<'_>) {
    if let Some(id) = column {
        let instrument = ctx.module.instrument(id);
        let same = channel.instrument == Some(id);
        let valid = instrument.is_some_and(|ins| ins.is_valid_for(note));
        match ctx.quirks.porta_policy(same, valid) {
            InstrumentChange::Continue => {}
            InstrumentChange::OldVolume => channel.set_volume(channel.default_volume),
            InstrumentChange::NewVolume => {
                if let Some(sub) = instrument.and_then(|ins| sub_for(ins, Some(note))) {
                    channel.set_volume(sub.volume);
                }
            }
            InstrumentChange::Cut => {
                channel.cut();
                return;
            }
        }

        if valid && !same {
            if ctx.has(QuirkFlags::PORTA_INSTRUMENT_PENDING) {
                channel.pending_instrument = Some(id);
            } else if let Some(ins) = instrument
                && let Some((sub_index, _)) = ins.resolve(note)
                && let Some(sub) = ins.subinstruments.get(sub_index)
            {
                channel.instrument = Some(id);
                channel.sub = Some(sub_index);
                channel.sample = sub.sample;
                channel.finetune = sub.finetune;
                channel.relative_note = sub.relative_note;
                channel.default_volume = sub.volume;
                channel.nna = ins.nna;
            }
        }
        if ctx.has(QuirkFlags::INSTRUMENT_RESETS_ENVELOPES) {
            channel.envelopes.reset = true;
        }
    }

    channel.target_period = target_period(channel, note, ctx);
    channel.note = Some(note);
}

/// Start a note, retriggering the sample
fn trigger(channel: &mut ChannelState, note: u8, column: Option<InstrumentId>, ctx: &Ctx<'_>) {
    let pending = channel.pending_instrument.take();
    let Some(id) = column.or(pending).or(channel.instrument) else {
        trace!("Channel {}: note {} without an instrument", channel.index, note);
        return;
    };
    let Some(instrument) = ctx.module.instrument(id) else {
        trace!("Channel {}: {} out of range", channel.index, id);
        return;
    };
    let Some((sub_index, played)) = instrument.resolve(note) else {
        match ctx.quirks.invalid_instrument {
            InvalidInstrument::Cut => channel.cut(),
            InvalidInstrument::Ignore => {}
        }
        return;
    };
    let Some(sub) = instrument.subinstruments.get(sub_index) else {
        return;
    };

    channel.instrument = Some(id);
    channel.sub = Some(sub_index);
    channel.sample = sub.sample;
    channel.note = Some(note);
    channel.played_note = Some(played);
    channel.finetune = sub.finetune;
    channel.relative_note = sub.relative_note;
    channel.default_volume = sub.volume;
    channel.nna = instrument.nna;

    if column.is_some() || pending.is_some() {
        channel.set_volume(sub.volume);
        if let Some(pan) = instrument.default_pan.or(sub.pan) {
            channel.pan = pan;
        }
    }

    let period = ctx.clamp_period(utils::note_period(
        ctx.mode,
        i16::from(played) + i16::from(sub.relative_note),
        sub.finetune,
    ));
    channel.base_period = period;
    channel.period = period;
    channel.output_period = period;
    channel.target_period = period;

    channel.vibrato.retrigger();
    channel.tremolo.retrigger();
    channel.tremor.counter = 0;
    channel.status = ChannelStatus::Playing;
    channel.action = NoteAction::Start { offset: 0 };
}

/// Instrument column without a note
fn instrument_only(channel: &mut ChannelState, id: InstrumentId, ctx: &Ctx<'_>) {
    let Some(instrument) = ctx.module.instrument(id) else {
        trace!("Channel {}: {} out of range", channel.index, id);
        return;
    };
    let sub = sub_for(instrument, channel.note);

    match ctx.quirks.instrument_without_note {
        InstrumentChange::Continue => {}
        InstrumentChange::OldVolume => channel.set_volume(channel.default_volume),
        InstrumentChange::NewVolume => {
            if let Some(sub) = sub {
                channel.set_volume(sub.volume);
                channel.default_volume = sub.volume;
            }
        }
        InstrumentChange::Cut => {
            channel.cut();
            return;
        }
    }
    if let Some(pan) = instrument.default_pan.or(sub.and_then(|sub| sub.pan)) {
        channel.pan = pan;
    }

    if channel.instrument != Some(id) {
        channel.pending_instrument = Some(id);
    }
    if ctx.has(QuirkFlags::INSTRUMENT_RESETS_ENVELOPES) && channel.is_active() {
        channel.envelopes.reset = true;
    }
}

/// Key off, cutting instead when the note has nothing to release into
pub(super) fn key_off(channel: &mut ChannelState, ctx: &Ctx<'_>) {
    let cut = ctx.has(QuirkFlags::KEYOFF_CUTS_UNENVELOPED)
        && channel
            .instrument
            .and_then(|id| ctx.module.instrument(id))
            .is_none_or(|ins| !ins.volume_envelope.as_ref().is_some_and(|env| env.enabled));
    channel.release(cut);
}

// =============================================================================
// Volume column
// =============================================================================

pub(super) fn apply_volume_column(channel: &mut ChannelState, event: &Event, ctx: &Ctx<'_>) {
    let Some(raw) = event.volume else {
        return;
    };
    match ctx.quirks.volume_column {
        VolumeColumn::None => {}
        VolumeColumn::Plain => {
            if raw <= 64 {
                channel.set_volume(raw);
            }
        }
        VolumeColumn::Xm => xm_volume(channel, raw),
        VolumeColumn::It => it_volume(channel, raw, ctx),
    }
}

fn xm_volume(channel: &mut ChannelState, raw: u8) {
    let x = raw & 0x0F;
    let step = i32::from(x) * i32::from(VOLUME_SCALE);
    match raw {
        0x10..=0x50 => channel.set_volume(raw - 0x10),
        0x60..=0x6F => channel.row.volume_column_slide = Some(-step),
        0x70..=0x7F => channel.row.volume_column_slide = Some(step),
        0x80..=0x8F => channel.slide_volume(-step),
        0x90..=0x9F => channel.slide_volume(step),
        0xA0..=0xAF => {
            if x != 0 {
                channel.vibrato.speed = x;
            }
        }
        0xB0..=0xBF => {
            if x != 0 {
                channel.vibrato.depth = x;
            }
            channel.row.vibrato = Some(1);
        }
        0xC0..=0xCF => channel.pan = x << 4,
        0xD0..=0xDF => channel.row.pan_slide = Some(-i32::from(x)),
        0xE0..=0xEF => channel.row.pan_slide = Some(i32::from(x)),
        0xF0..=0xFF => {
            if x != 0 {
                channel.porta_speed = x << 4;
            }
            channel.row.tone_porta = true;
        }
        _ => {}
    }
}

fn it_volume(channel: &mut ChannelState, raw: u8, ctx: &Ctx<'_>) {
    let scale = i32::from(VOLUME_SCALE);
    match raw {
        0..=64 => channel.set_volume(raw),
        65..=74 => channel.slide_volume(i32::from(raw - 65) * scale),
        75..=84 => channel.slide_volume(-i32::from(raw - 75) * scale),
        85..=94 => channel.row.volume_column_slide = Some(i32::from(raw - 85) * scale),
        95..=104 => channel.row.volume_column_slide = Some(-i32::from(raw - 95) * scale),
        105..=114 => channel.row.porta = Some(i32::from(raw - 105) * 4 * SLIDE_UNIT),
        115..=124 => channel.row.porta = Some(-i32::from(raw - 115) * 4 * SLIDE_UNIT),
        128..=192 => channel.pan = utils::pan_from_64(raw - 128),
        193..=202 => {
            let speed = IT_PORTA_SPEEDS[usize::from(raw - 193)];
            channel.porta_speed =
                channel
                    .memory
                    .recall(ctx.quirks.effect_memory, Slot::TonePorta, speed);
            channel.row.tone_porta = true;
        }
        203..=212 => {
            let depth = raw - 203;
            if depth != 0 {
                channel.vibrato.depth = depth;
            }
            channel.row.vibrato = Some(1);
        }
        _ => {}
    }
}

/// Apply the row's sample offset to a freshly started note
pub(super) fn finish_trigger(channel: &mut ChannelState, ctx: &Ctx<'_>) {
    let NoteAction::Start { .. } = channel.action else {
        return;
    };
    let Some(offset) = channel.sample_offset else {
        return;
    };
    let length = channel
        .sample
        .and_then(|id| ctx.module.sample(id))
        .map_or(0, |sample| sample.length);
    let offset = if offset < length {
        offset
    } else {
        match ctx.quirks.offset_beyond_end {
            OffsetBeyondEnd::Cut => {
                channel.cut();
                return;
            }
            OffsetBeyondEnd::Ignore => 0,
            OffsetBeyondEnd::Clamp => length.saturating_sub(1),
        }
    };
    channel.action = NoteAction::Start { offset };
}
