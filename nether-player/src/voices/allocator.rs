//! Channel-to-voice routing and per-tick command emission

use std::cmp::Ordering;

use smallvec::SmallVec;
use tracing::trace;

use nether_tracker::{
    DuplicateCheckAction, DuplicateCheckType, Instrument, Module, NewNoteAction, PastNoteAction,
    QuirkFlags, Sample, SampleLoop,
};

use super::{EnvelopeKind, FADE_MAX, Voice, VoiceState};
use crate::command::{LoopDescriptor, VoiceAction, VoiceCommand, VoiceId};
use crate::config::{MAX_VOICES, ReleasedVoicePolicy};
use crate::intent::{ChannelIntent, NoteAction};
use crate::utils;

/// Song-wide volume and output timing of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParams {
    /// Global volume (0-128)
    pub global_volume: u8,
    /// Output frames the tick lasts
    pub samples: u32,
    pub sample_rate: u32,
}

/// Maps song channels onto a fixed pool of physical voices
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    voices: Vec<Voice>,
    /// Voice currently driven by each song channel
    channel_voice: Vec<Option<VoiceId>>,
    policy: ReleasedVoicePolicy,
    /// Monotonic counter ordering starts and releases
    serial: u64,
}

impl VoiceAllocator {
    pub fn new(size: usize, channels: u8, policy: ReleasedVoicePolicy) -> Self {
        let size = size.clamp(1, MAX_VOICES);
        Self {
            voices: (0..size).map(|index| Voice::new(VoiceId(index as u16))).collect(),
            channel_voice: vec![None; usize::from(channels)],
            policy,
            serial: 0,
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id.index())
    }

    /// Voice driven by `channel`, if any
    pub fn channel_voice(&self, channel: u8) -> Option<VoiceId> {
        self.attached(channel).map(|index| self.voices[index].id)
    }

    /// Voices that are sounding (playing or released)
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|voice| !voice.is_free()).count()
    }

    /// Silence every voice and forget all channel assignments
    pub fn cut_all(&mut self) {
        for voice in &mut self.voices {
            voice.cut();
            voice.channel = None;
        }
        self.channel_voice.fill(None);
    }

    /// Route one tick of intents to voices and write the resulting commands
    ///
    /// Commands are written for every voice that sounds this tick or stopped
    /// since the previous one. Voices then advance by one tick.
    pub fn apply(
        &mut self,
        intents: &[ChannelIntent],
        module: &Module,
        mix: MixParams,
        commands: &mut SmallVec<[VoiceCommand; 32]>,
    ) {
        commands.clear();
        for intent in intents {
            if usize::from(intent.channel) >= self.channel_voice.len() {
                trace!("Intent for unknown channel {}", intent.channel);
                continue;
            }
            self.apply_intent(intent, module);
        }

        for voice in &mut self.voices {
            if voice.is_free() && voice.event.is_none() {
                continue;
            }
            let command = emit(voice, module, mix.global_volume);
            if !voice.is_free() {
                advance(voice, module, command.frequency, mix);
            }
            commands.push(command);
        }
    }

    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// Pool index of the voice `channel` drives
    fn attached(&self, channel: u8) -> Option<usize> {
        let id = self.channel_voice.get(usize::from(channel)).copied().flatten()?;
        let voice = self.voices.get(id.index())?;
        (voice.channel == Some(channel)).then_some(id.index())
    }

    fn apply_intent(&mut self, intent: &ChannelIntent, module: &Module) {
        let channel = intent.channel;

        if let Some(action) = intent.past_note {
            let serial = self.next_serial();
            for voice in self.voices.iter_mut().filter(|voice| {
                voice.channel.is_none() && voice.origin == channel && !voice.is_free()
            }) {
                match action {
                    PastNoteAction::Cut => voice.cut(),
                    PastNoteAction::Off => voice.release(serial),
                    PastNoteAction::Fade => voice.start_fade(serial),
                }
            }
        }

        match intent.action {
            NoteAction::Unchanged => {}
            NoteAction::Start { offset } => self.start(intent, offset, module),
            NoteAction::Retrigger => {
                if let Some(index) = self.attached(channel) {
                    self.voices[index].retrigger();
                }
            }
            NoteAction::Release => {
                let serial = self.next_serial();
                if let Some(index) = self.attached(channel) {
                    self.voices[index].release(serial);
                }
            }
            NoteAction::Fade => {
                let serial = self.next_serial();
                if let Some(index) = self.attached(channel) {
                    self.voices[index].start_fade(serial);
                }
            }
            NoteAction::Cut => {
                if let Some(index) = self.attached(channel) {
                    self.voices[index].cut();
                }
            }
        }

        let Some(index) = self.attached(channel) else {
            return;
        };
        let voice = &mut self.voices[index];
        if voice.is_free() {
            return;
        }
        voice.follow(intent);
        if voice.instrument != intent.instrument || voice.sample != intent.sample {
            voice.bind(module, intent.instrument, intent.sample);
        }
        let envelopes = intent.envelopes;
        if envelopes.reset {
            voice.reset_envelopes();
        }
        if let Some(tick) = envelopes.position {
            voice.set_envelope_position(tick);
        }
        if let Some(toggle) = envelopes.toggle {
            voice.toggle_envelope(toggle);
        }
    }

    /// Start a note: duplicate check, displace the channel's voice, pick a voice
    fn start(&mut self, intent: &ChannelIntent, offset: u32, module: &Module) {
        let channel = intent.channel;
        let serial = self.next_serial();
        let new_note_actions = module.quirks().has(QuirkFlags::NEW_NOTE_ACTIONS);

        if new_note_actions
            && let Some(instrument) = intent.instrument.and_then(|id| module.instrument(id))
        {
            self.duplicate_check(intent, instrument, serial);
        }

        let carried = self
            .attached(channel)
            .map(|index| &self.voices[index])
            .filter(|voice| voice.instrument == intent.instrument)
            .map(|voice| voice.envelopes);
        let reuse = self.displace(channel, new_note_actions, module, serial);

        if intent
            .sample
            .and_then(|id| module.sample(id))
            .is_none_or(Sample::is_empty)
        {
            trace!("Channel {} starts a note without a playable sample", channel);
            return;
        }

        let id = reuse.unwrap_or_else(|| self.select());
        self.claim(id, channel);
        self.voices[id.index()].start(intent, offset, module, serial, carried);
    }

    /// Apply the instrument's duplicate check action to matching background notes
    fn duplicate_check(&mut self, intent: &ChannelIntent, instrument: &Instrument, serial: u64) {
        if instrument.dct == DuplicateCheckType::Off {
            return;
        }
        for voice in self.voices.iter_mut().filter(|voice| {
            voice.channel.is_none() && voice.origin == intent.channel && !voice.is_free()
        }) {
            let duplicate = match instrument.dct {
                DuplicateCheckType::Off => false,
                DuplicateCheckType::Note => {
                    voice.note == intent.note && voice.instrument == intent.instrument
                }
                DuplicateCheckType::Sample => voice.sample == intent.sample,
                DuplicateCheckType::Instrument => voice.instrument == intent.instrument,
            };
            if duplicate {
                match instrument.dca {
                    DuplicateCheckAction::Cut => voice.cut(),
                    DuplicateCheckAction::NoteOff => voice.release(serial),
                    DuplicateCheckAction::NoteFade => voice.start_fade(serial),
                }
            }
        }
    }

    /// Move the channel's current note out of the way of a new one
    ///
    /// Returns the voice to reuse in place when the old note was cut.
    fn displace(
        &mut self,
        channel: u8,
        new_note_actions: bool,
        module: &Module,
        serial: u64,
    ) -> Option<VoiceId> {
        let index = self.attached(channel)?;
        let voice = &mut self.voices[index];
        if voice.is_free() {
            return Some(voice.id);
        }

        let action = if new_note_actions {
            voice.nna
        } else if voice.can_fade(voice.instrument.and_then(|id| module.instrument(id))) {
            NewNoteAction::NoteOff
        } else {
            NewNoteAction::Cut
        };
        voice.displace(action, serial);
        if voice.is_free() {
            return Some(voice.id);
        }

        trace!(
            "Voice {} detached from channel {} ({:?})",
            voice.id.0, channel, action
        );
        voice.channel = None;
        self.channel_voice[usize::from(channel)] = None;
        None
    }

    /// Voice for a new note: free, then released, then stolen
    fn select(&self) -> VoiceId {
        let free = self
            .voices
            .iter()
            .filter(|voice| voice.is_free())
            .min_by_key(|voice| (voice.channel.is_some(), voice.event.is_some(), voice.id));
        if let Some(voice) = free {
            return voice.id;
        }

        let policy = self.policy;
        let released = self
            .voices
            .iter()
            .filter(|voice| voice.is_released())
            .min_by(|a, b| {
                let quieter = a.level.total_cmp(&b.level);
                let older = a.released.cmp(&b.released);
                let order = match policy {
                    ReleasedVoicePolicy::Quietest => quieter.then(older),
                    ReleasedVoicePolicy::LongestReleased => older.then(quieter),
                };
                attached_last(a, b).then(order).then(a.id.cmp(&b.id))
            });
        if let Some(voice) = released {
            return voice.id;
        }

        let stolen = self
            .voices
            .iter()
            .min_by(|a, b| {
                attached_last(a, b)
                    .then(a.level.total_cmp(&b.level))
                    .then(a.started.cmp(&b.started))
                    .then(a.id.cmp(&b.id))
            })
            .map_or(VoiceId(0), |voice| voice.id);
        trace!("Voice pool exhausted, stealing voice {}", stolen.0);
        stolen
    }

    /// Attach voice `id` to `channel`, detaching it from any other channel
    fn claim(&mut self, id: VoiceId, channel: u8) {
        let voice = &mut self.voices[id.index()];
        if let Some(previous) = voice.channel
            && previous != channel
            && self.channel_voice[usize::from(previous)] == Some(id)
        {
            self.channel_voice[usize::from(previous)] = None;
        }
        voice.channel = Some(channel);
        self.channel_voice[usize::from(channel)] = Some(id);
    }
}

/// Detached voices sort before voices a channel still drives
fn attached_last(a: &Voice, b: &Voice) -> Ordering {
    a.channel.is_some().cmp(&b.channel.is_some())
}

/// Current value of an envelope the voice has switched on
fn envelope_value(voice: &Voice, instrument: Option<&Instrument>, kind: EnvelopeKind) -> Option<i8> {
    let state = voice.envelope(kind);
    if !state.enabled {
        return None;
    }
    instrument
        .and_then(|ins| kind.of(ins))
        .map(|envelope| state.cursor.value(envelope))
}

/// Auto-vibrato period offset
fn auto_vibrato(voice: &Voice) -> i32 {
    let vibrato = voice.auto_vibrato;
    if !vibrato.is_active() {
        return 0;
    }
    let full = u32::from(vibrato.depth) << 8;
    let depth = if vibrato.sweep == 0 {
        full
    } else {
        voice.vibrato_sweep.min(full)
    };
    utils::waveform_value(vibrato.waveform, voice.vibrato_position) * depth as i32 / (64 * 256)
}

fn loop_descriptor(sample: &Sample, released: bool) -> LoopDescriptor {
    let describe = |range: SampleLoop, sustain: bool| LoopDescriptor {
        mode: range.mode,
        start: range.start,
        end: range.end,
        sustain,
    };
    if !released && sample.sustain.is_active() {
        describe(sample.sustain, true)
    } else if sample.looping.is_active() {
        describe(sample.looping, false)
    } else {
        LoopDescriptor::default()
    }
}

/// Build this tick's command for a voice
fn emit(voice: &mut Voice, module: &Module, global_volume: u8) -> VoiceCommand {
    let instrument = voice.instrument.and_then(|id| module.instrument(id));
    let sample = voice.sample.and_then(|id| module.sample(id));
    let action = voice.event.take().unwrap_or(VoiceAction::Continue);
    let sounding = !voice.is_free();

    let mut gain = 0.0;
    if sounding {
        gain = f32::from(voice.channel_volume.min(64)) / 64.0
            * f32::from(global_volume.min(128)) / 128.0
            * instrument.map_or(1.0, |ins| f32::from(ins.global_volume.min(128)) / 128.0)
            * f32::from(voice.sample_volume) / 64.0
            * voice.fade as f32 / FADE_MAX as f32;
        if let Some(value) = envelope_value(voice, instrument, EnvelopeKind::Volume) {
            gain *= f32::from(value.clamp(0, 64)) / 64.0;
        }
    }

    let mut pan = i32::from(voice.pan);
    if let Some(value) = envelope_value(voice, instrument, EnvelopeKind::Pan) {
        let room = 128 - (pan - 128).abs();
        pan = (pan + i32::from(value) * room / 32).clamp(0, 255);
    }

    let period = if voice.period > 0 {
        voice.period + auto_vibrato(voice)
    } else {
        voice.period
    };
    let mode = module.header().period_mode;
    let mut frequency = sample.map_or(0.0, |s| utils::period_frequency(mode, period, s.c_rate));
    if let Some(value) = envelope_value(voice, instrument, EnvelopeKind::Pitch) {
        // Half-semitone steps
        frequency *= utils::pitch_ratio(i32::from(value) * 32);
    }

    let released = voice.state == VoiceState::Released;
    let command = VoiceCommand {
        voice: voice.id,
        channel: voice.channel,
        action,
        note: voice.note,
        period,
        frequency,
        volume: if sounding { voice.volume } else { 0 },
        gain,
        pan: pan as u8,
        instrument: voice.instrument,
        sample: voice.sample,
        loop_descriptor: sample.map_or_else(LoopDescriptor::default, |s| {
            loop_descriptor(s, released)
        }),
    };
    voice.level = command.level();
    command
}

/// Step a sounding voice by one tick; free it once it can no longer be heard
fn advance(voice: &mut Voice, module: &Module, frequency: f32, mix: MixParams) {
    let instrument = voice.instrument.and_then(|id| module.instrument(id));
    let released = voice.state == VoiceState::Released;

    let mut silent_envelope = false;
    if let Some(ins) = instrument {
        for kind in EnvelopeKind::ALL {
            let state = &mut voice.envelopes[kind as usize];
            if state.enabled
                && let Some(envelope) = kind.of(ins)
            {
                state.cursor.advance(envelope, released);
                if kind == EnvelopeKind::Volume {
                    silent_envelope =
                        state.cursor.finished && state.cursor.value(envelope) <= 0;
                }
            }
        }
        if voice.fading {
            voice.fade = voice.fade.saturating_sub(ins.fadeout);
        }
    }

    let vibrato = voice.auto_vibrato;
    if vibrato.is_active() {
        voice.vibrato_position = voice.vibrato_position.wrapping_add(vibrato.rate);
        if vibrato.sweep > 0 {
            let step = (u32::from(vibrato.depth) << 8) / u32::from(vibrato.sweep);
            voice.vibrato_sweep = voice.vibrato_sweep.saturating_add(step.max(1));
        }
    }

    let sample_running = voice
        .sample
        .and_then(|id| module.sample(id))
        .is_some_and(|sample| advance_position(voice, sample, frequency, mix, released));

    if !sample_running || (voice.fading && voice.fade == 0) || silent_envelope {
        voice.finish();
    }
}

/// Move the playback position by one tick's worth of frames
///
/// Returns `false` once a sample without an active loop has played out.
fn advance_position(
    voice: &mut Voice,
    sample: &Sample,
    frequency: f32,
    mix: MixParams,
    released: bool,
) -> bool {
    let frames = f64::from(frequency) * f64::from(mix.samples) / f64::from(mix.sample_rate.max(1));
    voice.position += frames;

    let active = if !released && sample.sustain.is_active() {
        sample.sustain
    } else {
        sample.looping
    };
    if active.is_active() && active.end > active.start {
        let (start, end) = (f64::from(active.start), f64::from(active.end));
        if voice.position >= end {
            voice.position = start + (voice.position - start) % (end - start);
        }
        return true;
    }
    voice.position < f64::from(sample.length)
}
