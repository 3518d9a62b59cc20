//! Song channel runtime state

use nether_tracker::{
    EffectMemory, Event, InstrumentId, NewNoteAction, PastNoteAction, SampleId, VibratoWaveform,
};

use crate::intent::{ChannelIntent, EnvelopeControl, NoteAction};

/// Internal volume steps per nominal volume step
pub const VOLUME_SCALE: u16 = 16;

/// Highest internal note volume (64 × 16)
pub const VOLUME_MAX: u16 = 64 * VOLUME_SCALE;

/// Highest channel volume
pub const CHANNEL_VOLUME_MAX: u8 = 64;

/// Life cycle of the note on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    /// Nothing has played yet
    #[default]
    Idle,
    /// A note is sounding
    Playing,
    /// Key off issued, envelopes and fadeout still running
    Released,
    /// Silenced
    Cut,
}

/// Vibrato / tremolo oscillator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Oscillator {
    pub waveform: VibratoWaveform,
    /// Keep the position when a new note starts
    pub continuous: bool,
    /// Position in a 256-step cycle
    pub position: u8,
    pub speed: u8,
    pub depth: u8,
}

impl Oscillator {
    /// Take speed and depth from an `xy` parameter; zero nibbles keep the old value
    pub fn set_params(&mut self, param: u8) {
        if param >> 4 != 0 {
            self.speed = param >> 4;
        }
        if param & 0x0F != 0 {
            self.depth = param & 0x0F;
        }
    }

    /// Waveform selector: low two bits pick the shape, bit 2 disables retrigger
    pub fn set_waveform(&mut self, selector: u8) {
        self.waveform = VibratoWaveform::from_bits(selector);
        self.continuous = selector & 0x04 != 0;
    }

    pub fn retrigger(&mut self) {
        if !self.continuous {
            self.position = 0;
        }
    }

    pub fn step(&mut self) {
        self.position = self.position.wrapping_add(self.speed << 2);
    }
}

/// Tremor on/off counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tremor {
    pub on_ticks: u8,
    pub off_ticks: u8,
    pub counter: u8,
    pub muted: bool,
}

/// Pattern loop state (per channel, or shared under a global-loop quirk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopState {
    /// Row the loop returns to
    pub row: u16,
    /// Remaining repetitions, zero when no loop is running
    pub count: u8,
}

// =============================================================================
// Effect parameter memory
// =============================================================================

/// Effects whose zero parameter recalls an earlier value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    PortaUp,
    PortaDown,
    TonePorta,
    VolumeSlide,
    Tremor,
    Arpeggio,
    Retrigger,
    SampleOffset,
    ChannelVolumeSlide,
    PanSlide,
    GlobalVolumeSlide,
    TempoSlide,
}

const SLOT_COUNT: usize = 12;

/// Remembered effect parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ParamMemory {
    values: [u8; SLOT_COUNT],
}

impl ParamMemory {
    /// Store a non-zero `param`, or return the value it shares memory with
    pub fn recall(&mut self, scope: EffectMemory, slot: Slot, param: u8) -> u8 {
        let key = Self::key(scope, slot);
        if param != 0 {
            self.values[key] = param;
        }
        self.values[key]
    }

    fn key(scope: EffectMemory, slot: Slot) -> usize {
        use Slot::*;
        let shared = match (scope, slot) {
            (EffectMemory::SharedPitchSlides, PortaDown) => PortaUp,
            (EffectMemory::LinkedPortamento, PortaDown | TonePorta) => PortaUp,
            (
                EffectMemory::Shared,
                PortaUp | PortaDown | VolumeSlide | Tremor | Arpeggio | Retrigger,
            ) => VolumeSlide,
            _ => slot,
        };
        shared as usize
    }
}

// =============================================================================
// Row-scoped effects
// =============================================================================

/// Continuing effects registered by the current row
///
/// Everything here is cleared when the next row starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RowEffects {
    /// Arpeggio parameter (x, y semitones)
    pub arpeggio: Option<u8>,
    /// Period change per tick after the first (negative raises pitch)
    pub porta: Option<i32>,
    pub tone_porta: bool,
    /// Vibrato depth divisor (1 regular, 4 fine)
    pub vibrato: Option<i32>,
    pub tremolo: bool,
    pub tremor: bool,
    /// Internal volume change per tick after the first
    pub volume_slide: Option<i32>,
    /// Volume column slide, independent of the effect column
    pub volume_column_slide: Option<i32>,
    pub channel_volume_slide: Option<i32>,
    pub pan_slide: Option<i32>,
    /// Interval and volume operation
    pub retrigger: Option<(u8, u8)>,
    pub note_cut: Option<u8>,
    pub key_off: Option<u8>,
    /// Tick and the event whose note part is delayed
    pub note_delay: Option<(u8, Event)>,
}

// =============================================================================
// Channel state
// =============================================================================

/// Runtime state of one song channel
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub index: u8,
    pub status: ChannelStatus,

    // Instrument
    /// Instrument logically playing
    pub instrument: Option<InstrumentId>,
    /// Instrument picked up by the next note (IT tone portamento, lone instrument column)
    pub pending_instrument: Option<InstrumentId>,
    /// Sub-instrument index inside `instrument`
    pub sub: Option<usize>,
    pub sample: Option<SampleId>,
    /// Pattern note that started the current sound
    pub note: Option<u8>,
    /// Note handed to the sample after keymap transposition
    pub played_note: Option<u8>,
    pub finetune: i8,
    pub relative_note: i8,
    /// Default volume of the current sub-instrument (0-64)
    pub default_volume: u8,
    pub nna: NewNoteAction,

    // Pitch
    /// Period the note started at
    pub base_period: i32,
    /// Period after slides
    pub period: i32,
    /// Period emitted this tick (vibrato and arpeggio included)
    pub output_period: i32,
    /// Tone portamento destination
    pub target_period: i32,
    pub porta_speed: u8,
    pub glissando: bool,

    // Volume and panning
    /// Note volume at internal resolution (0-1024)
    pub volume: u16,
    /// Volume emitted this tick (tremolo and tremor included)
    pub output_volume: u16,
    pub channel_volume: u8,
    pub pan: u8,

    // Oscillators
    pub vibrato: Oscillator,
    pub tremolo: Oscillator,
    pub tremor: Tremor,

    // Effect state
    pub(crate) row: RowEffects,
    pub(crate) memory: ParamMemory,
    pub(crate) offset_high: u8,
    pub(crate) loop_state: LoopState,

    // Requests collected for this tick's intent
    pub(crate) action: NoteAction,
    pub(crate) sample_offset: Option<u32>,
    pub(crate) past_note: Option<PastNoteAction>,
    pub(crate) envelopes: EnvelopeControl,
}

impl ChannelState {
    pub fn new(index: u8, pan: u8, channel_volume: u8) -> Self {
        Self {
            index,
            status: ChannelStatus::Idle,
            instrument: None,
            pending_instrument: None,
            sub: None,
            sample: None,
            note: None,
            played_note: None,
            finetune: 0,
            relative_note: 0,
            default_volume: 0,
            nna: NewNoteAction::Cut,
            base_period: 0,
            period: 0,
            output_period: 0,
            target_period: 0,
            porta_speed: 0,
            glissando: false,
            volume: 0,
            output_volume: 0,
            channel_volume: channel_volume.min(CHANNEL_VOLUME_MAX),
            pan,
            vibrato: Oscillator::default(),
            tremolo: Oscillator::default(),
            tremor: Tremor::default(),
            row: RowEffects::default(),
            memory: ParamMemory::default(),
            offset_high: 0,
            loop_state: LoopState::default(),
            action: NoteAction::Unchanged,
            sample_offset: None,
            past_note: None,
            envelopes: EnvelopeControl::default(),
        }
    }

    /// Whether a note is sounding or fading on this channel
    pub fn is_active(&self) -> bool {
        matches!(self.status, ChannelStatus::Playing | ChannelStatus::Released)
    }

    /// Clear effects registered by the previous row
    pub(crate) fn reset_row_effects(&mut self) {
        self.row = RowEffects::default();
        self.tremor.muted = false;
        self.sample_offset = None;
    }

    pub(crate) fn set_volume(&mut self, nominal: u8) {
        self.volume = u16::from(nominal.min(64)) * VOLUME_SCALE;
    }

    pub(crate) fn slide_volume(&mut self, delta: i32) {
        self.volume = (i32::from(self.volume) + delta).clamp(0, i32::from(VOLUME_MAX)) as u16;
    }

    pub(crate) fn slide_channel_volume(&mut self, delta: i32) {
        self.channel_volume =
            (i32::from(self.channel_volume) + delta).clamp(0, i32::from(CHANNEL_VOLUME_MAX)) as u8;
    }

    pub(crate) fn slide_pan(&mut self, delta: i32) {
        self.pan = (i32::from(self.pan) + delta).clamp(0, 255) as u8;
    }

    /// Silence the channel
    pub(crate) fn cut(&mut self) {
        self.status = ChannelStatus::Cut;
        self.action = NoteAction::Cut;
        self.volume = 0;
    }

    /// Key off; `cut_instead` when the note has nothing to fade with
    pub(crate) fn release(&mut self, cut_instead: bool) {
        if !self.is_active() {
            return;
        }
        if cut_instead {
            self.cut();
        } else {
            self.status = ChannelStatus::Released;
            self.action = NoteAction::Release;
        }
    }

    pub(crate) fn fade(&mut self) {
        if self.is_active() {
            self.status = ChannelStatus::Released;
            self.action = NoteAction::Fade;
        }
    }

    /// Build this tick's intent and clear the one-shot requests
    pub(crate) fn take_intent(&mut self) -> ChannelIntent {
        let action = std::mem::take(&mut self.action);
        ChannelIntent {
            channel: self.index,
            action,
            note: self.played_note,
            instrument: self.instrument,
            sample: self.sample,
            period: self.output_period,
            volume: self.output_volume,
            channel_volume: self.channel_volume,
            pan: self.pan,
            nna: self.nna,
            past_note: self.past_note.take(),
            envelopes: std::mem::take(&mut self.envelopes),
        }
    }
}
