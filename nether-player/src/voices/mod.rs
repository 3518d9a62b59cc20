//! Physical voice pool
//!
//! Song channels hold an index into a flat pool of voices rather than owning
//! a voice. A voice carries its own envelope cursors and fadeout, so a note
//! detached from its channel (new note action, duplicate check, steal) keeps
//! evolving on its own until it ends or is reclaimed.

mod allocator;
mod envelope;

pub use allocator::{MixParams, VoiceAllocator};
pub use envelope::EnvelopeCursor;

use nether_tracker::{
    AutoVibrato, Envelope, EnvelopeToggle, Instrument, InstrumentId, Module, NewNoteAction,
    SampleId,
};

use crate::command::{VoiceAction, VoiceId};
use crate::intent::ChannelIntent;

/// Fadeout counter of a note that has not started fading
pub const FADE_MAX: u32 = 65536;

/// Life cycle of a physical voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// Available for a new note
    #[default]
    Free,
    /// Sounding, sustain held
    Playing,
    /// Key off: sustain loops left, fadeout running
    Released,
}

/// The three instrument envelopes a voice follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Volume = 0,
    Pan = 1,
    Pitch = 2,
}

impl EnvelopeKind {
    pub const ALL: [Self; 3] = [Self::Volume, Self::Pan, Self::Pitch];

    pub fn of(self, instrument: &Instrument) -> Option<&Envelope> {
        match self {
            Self::Volume => instrument.volume_envelope.as_ref(),
            Self::Pan => instrument.pan_envelope.as_ref(),
            Self::Pitch => instrument.pitch_envelope.as_ref(),
        }
    }
}

/// Cursor and on/off switch of one envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeState {
    pub cursor: EnvelopeCursor,
    pub enabled: bool,
}

/// One physical playback slot
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: VoiceId,
    pub state: VoiceState,
    /// Fadeout counter is running down
    pub fading: bool,
    /// Song channel driving the voice; `None` once detached
    pub channel: Option<u8>,
    /// Song channel that started the note
    pub origin: u8,

    // Note
    pub instrument: Option<InstrumentId>,
    pub sample: Option<SampleId>,
    pub note: Option<u8>,
    pub nna: NewNoteAction,

    // Latest channel parameters
    pub period: i32,
    /// Note volume at internal resolution (0-1024)
    pub volume: u16,
    pub channel_volume: u8,
    pub pan: u8,

    // Captured from the sub-instrument at note start
    pub(crate) sample_volume: u8,
    pub(crate) auto_vibrato: AutoVibrato,
    pub(crate) vibrato_position: u8,
    /// Auto-vibrato depth reached so far, in 1/256 steps
    pub(crate) vibrato_sweep: u32,

    pub(crate) envelopes: [EnvelopeState; 3],
    /// Fadeout counter (65536 = full volume)
    pub(crate) fade: u32,
    /// Playback position in sample frames
    pub(crate) position: f64,

    // Allocation bookkeeping
    pub(crate) started: u64,
    pub(crate) released: Option<u64>,
    /// Action reported with the next command
    pub(crate) event: Option<VoiceAction>,
    /// Loudness of the last command (0.0-1.0)
    pub(crate) level: f32,
}

impl Voice {
    pub fn new(id: VoiceId) -> Self {
        Self {
            id,
            state: VoiceState::Free,
            fading: false,
            channel: None,
            origin: 0,
            instrument: None,
            sample: None,
            note: None,
            nna: NewNoteAction::Cut,
            period: 0,
            volume: 0,
            channel_volume: 64,
            pan: 128,
            sample_volume: 64,
            auto_vibrato: AutoVibrato::default(),
            vibrato_position: 0,
            vibrato_sweep: 0,
            envelopes: [EnvelopeState::default(); 3],
            fade: FADE_MAX,
            position: 0.0,
            started: 0,
            released: None,
            event: None,
            level: 0.0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    /// Released or fading: a candidate for reuse before active notes
    pub fn is_released(&self) -> bool {
        self.state == VoiceState::Released || self.fading
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn envelope(&self, kind: EnvelopeKind) -> EnvelopeState {
        self.envelopes[kind as usize]
    }

    /// Fadeout counter (65536 = full volume)
    pub fn fade(&self) -> u32 {
        self.fade
    }

    /// Start a note for `intent`; envelope cursors listed in `carried` are kept
    pub(crate) fn start(
        &mut self,
        intent: &ChannelIntent,
        offset: u32,
        module: &Module,
        serial: u64,
        carried: Option<[EnvelopeState; 3]>,
    ) {
        self.state = VoiceState::Playing;
        self.fading = false;
        self.origin = intent.channel;
        self.note = intent.note;
        self.fade = FADE_MAX;
        self.position = f64::from(offset);
        self.started = serial;
        self.released = None;
        self.event = Some(VoiceAction::Start { offset });
        self.vibrato_position = 0;
        self.vibrato_sweep = 0;
        self.follow(intent);
        self.bind(module, intent.instrument, intent.sample);

        let instrument = intent.instrument.and_then(|id| module.instrument(id));
        for kind in EnvelopeKind::ALL {
            let envelope = instrument.and_then(|ins| kind.of(ins));
            let state = &mut self.envelopes[kind as usize];
            state.enabled = envelope.is_some_and(|env| env.enabled);
            match carried {
                Some(previous) if envelope.is_some_and(|env| env.carry) => {
                    state.cursor = previous[kind as usize].cursor;
                }
                _ => state.cursor.reset(),
            }
        }
    }

    /// Take over the channel's latest parameters
    pub(crate) fn follow(&mut self, intent: &ChannelIntent) {
        self.period = intent.period;
        self.volume = intent.volume;
        self.channel_volume = intent.channel_volume;
        self.pan = intent.pan;
        self.nna = intent.nna;
    }

    /// Point the voice at an instrument and sample, capturing the sub-instrument's settings
    pub(crate) fn bind(
        &mut self,
        module: &Module,
        instrument: Option<InstrumentId>,
        sample: Option<SampleId>,
    ) {
        self.instrument = instrument;
        self.sample = sample;
        let sub = instrument
            .and_then(|id| module.instrument(id))
            .and_then(|ins| ins.subinstruments.iter().find(|sub| sub.sample == sample));
        self.sample_volume = sub.map_or(64, |sub| sub.global_volume.min(64));
        self.auto_vibrato = sub.map(|sub| sub.vibrato).unwrap_or_default();
    }

    /// Key off
    pub(crate) fn release(&mut self, serial: u64) {
        if self.state != VoiceState::Playing {
            return;
        }
        self.state = VoiceState::Released;
        self.fading = true;
        self.released.get_or_insert(serial);
        if !matches!(self.event, Some(VoiceAction::Start { .. })) {
            self.event = Some(VoiceAction::Release);
        }
    }

    /// Start the fadeout without leaving sustain
    pub(crate) fn start_fade(&mut self, serial: u64) {
        if self.is_free() {
            return;
        }
        self.fading = true;
        self.released.get_or_insert(serial);
    }

    pub(crate) fn cut(&mut self) {
        if self.is_free() && self.event.is_none() {
            return;
        }
        self.state = VoiceState::Free;
        self.fading = false;
        self.event = Some(VoiceAction::Cut);
    }

    /// Apply a new note action to a voice being displaced
    pub(crate) fn displace(&mut self, action: NewNoteAction, serial: u64) {
        match action {
            NewNoteAction::Cut => self.cut(),
            NewNoteAction::Continue => {}
            NewNoteAction::NoteOff => self.release(serial),
            NewNoteAction::NoteFade => self.start_fade(serial),
        }
    }

    /// Whether a released note would ever fall silent on its own
    pub(crate) fn can_fade(&self, instrument: Option<&Instrument>) -> bool {
        self.envelopes[EnvelopeKind::Volume as usize].enabled
            || instrument.is_some_and(|ins| ins.fadeout > 0)
    }

    pub(crate) fn toggle_envelope(&mut self, toggle: EnvelopeToggle) {
        let (kind, on) = match toggle {
            EnvelopeToggle::VolumeOff => (EnvelopeKind::Volume, false),
            EnvelopeToggle::VolumeOn => (EnvelopeKind::Volume, true),
            EnvelopeToggle::PanOff => (EnvelopeKind::Pan, false),
            EnvelopeToggle::PanOn => (EnvelopeKind::Pan, true),
            EnvelopeToggle::PitchOff => (EnvelopeKind::Pitch, false),
            EnvelopeToggle::PitchOn => (EnvelopeKind::Pitch, true),
        };
        self.envelopes[kind as usize].enabled = on;
    }

    /// Restart every envelope and the fadeout, keeping the sample running
    pub(crate) fn reset_envelopes(&mut self) {
        for state in &mut self.envelopes {
            state.cursor.reset();
        }
        self.fade = FADE_MAX;
        self.fading = false;
    }

    pub(crate) fn set_envelope_position(&mut self, tick: u16) {
        self.envelopes[EnvelopeKind::Volume as usize]
            .cursor
            .set_position(tick);
        self.envelopes[EnvelopeKind::Pan as usize]
            .cursor
            .set_position(tick);
    }

    /// Restart the sample in place (multi-retrigger)
    pub(crate) fn retrigger(&mut self) {
        if self.is_free() {
            self.state = VoiceState::Playing;
            self.fade = FADE_MAX;
        }
        self.position = 0.0;
        self.event = Some(VoiceAction::Start { offset: 0 });
    }

    /// Return to the pool once the last command has been reported
    pub(crate) fn finish(&mut self) {
        self.state = VoiceState::Free;
        self.fading = false;
        self.event = Some(VoiceAction::Idle);
    }
}
