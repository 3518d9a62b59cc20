//! Instrument data structures and envelopes

use crate::{NOTE_COUNT, SampleId};

/// Unified tracker instrument
///
/// Notes are mapped through the keymap onto one of the instrument's
/// sub-instruments. An instrument without sub-instruments is valid and silent.
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Instrument name
    pub name: String,
    /// Instrument global volume (0-128)
    pub global_volume: u8,
    /// Amount subtracted per tick from a 0-65536 fade counter after release
    pub fadeout: u32,
    /// Default panning (0-255), overrides the sub-instrument pan when set
    pub default_pan: Option<u8>,
    /// Volume envelope (values 0-64)
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope (values -32..=32)
    pub pan_envelope: Option<Envelope>,
    /// Pitch envelope (values -32..=32 half-semitones)
    pub pitch_envelope: Option<Envelope>,
    /// New note action
    pub nna: NewNoteAction,
    /// Duplicate check type
    pub dct: DuplicateCheckType,
    /// Duplicate check action
    pub dca: DuplicateCheckAction,
    /// Note → (sub-instrument, played note), one entry per note
    pub keymap: Vec<KeymapEntry>,
    /// Sample/tuning tuples the keymap points into
    pub subinstruments: Vec<SubInstrument>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: String::new(),
            global_volume: 128,
            fadeout: 0,
            default_pan: None,
            volume_envelope: None,
            pan_envelope: None,
            pitch_envelope: None,
            nna: NewNoteAction::Cut,
            dct: DuplicateCheckType::Off,
            dca: DuplicateCheckAction::Cut,
            keymap: vec![KeymapEntry::UNMAPPED; NOTE_COUNT],
            subinstruments: Vec::new(),
        }
    }
}

impl Instrument {
    /// Instrument whose every note plays `sub` untransposed
    ///
    /// This is how sample-only formats (MOD, S3M, IT sample mode) are expressed.
    pub fn single(name: impl Into<String>, sub: SubInstrument) -> Self {
        let mut instrument = Self {
            name: name.into(),
            ..Self::default()
        };
        instrument.subinstruments.push(sub);
        for (note, entry) in instrument.keymap.iter_mut().enumerate() {
            *entry = KeymapEntry {
                sub: Some(0),
                note: note as u8,
            };
        }
        instrument
    }

    /// Resolve a note to its sub-instrument index and the note actually played
    ///
    /// Returns `None` when the note is unmapped, the mapped sub-instrument does
    /// not exist, or it has no sample.
    pub fn resolve(&self, note: u8) -> Option<(usize, u8)> {
        let entry = self.keymap.get(note as usize)?;
        let sub = entry.sub? as usize;
        self.subinstruments.get(sub)?.sample?;
        Some((sub, entry.note))
    }

    /// Whether `note` reaches a sub-instrument with a sample
    pub fn is_valid_for(&self, note: u8) -> bool {
        self.resolve(note).is_some()
    }

    /// Sub-instrument used for volume/pan defaults when no note is known
    pub fn primary_sub(&self) -> Option<&SubInstrument> {
        self.subinstruments.iter().find(|sub| sub.sample.is_some())
    }
}

/// One keymap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeymapEntry {
    /// Sub-instrument index, `None` when the note is unmapped
    pub sub: Option<u8>,
    /// Note handed to the sub-instrument (transposition)
    pub note: u8,
}

impl KeymapEntry {
    pub const UNMAPPED: Self = Self { sub: None, note: 0 };
}

/// A (sample, default volume, tuning) tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubInstrument {
    /// Sample played, `None` when the reference was dropped at load
    pub sample: Option<SampleId>,
    /// Default volume (0-64)
    pub volume: u8,
    /// Sample global volume (0-64)
    pub global_volume: u8,
    /// Default panning (0-255), `None` keeps the channel pan
    pub pan: Option<u8>,
    /// Finetune in 1/128 semitone steps
    pub finetune: i8,
    /// Semitone offset applied to the played note
    pub relative_note: i8,
    /// Automatic vibrato applied to every note
    pub vibrato: AutoVibrato,
}

impl Default for SubInstrument {
    fn default() -> Self {
        Self {
            sample: None,
            volume: 64,
            global_volume: 64,
            pan: None,
            finetune: 0,
            relative_note: 0,
            vibrato: AutoVibrato::default(),
        }
    }
}

/// Instrument auto-vibrato
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoVibrato {
    /// Oscillator shape
    pub waveform: VibratoWaveform,
    /// Ticks to reach full depth
    pub sweep: u8,
    /// Depth (0-15 XM, 0-64 IT)
    pub depth: u8,
    /// Oscillator speed
    pub rate: u8,
}

impl AutoVibrato {
    pub fn is_active(&self) -> bool {
        self.depth > 0 && self.rate > 0
    }
}

/// Oscillator shape shared by vibrato, tremolo and auto-vibrato
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VibratoWaveform {
    #[default]
    Sine,
    RampDown,
    Square,
    Random,
}

impl VibratoWaveform {
    /// Decode the two low bits of a waveform selector
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::Sine,
            1 => Self::RampDown,
            2 => Self::Square,
            _ => Self::Random,
        }
    }
}

/// New Note Action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum NewNoteAction {
    /// Cut the previous note immediately
    #[default]
    Cut = 0,
    /// Continue playing in background
    Continue = 1,
    /// Release the previous note
    NoteOff = 2,
    /// Fade out the previous note
    NoteFade = 3,
}

impl NewNoteAction {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Continue,
            2 => Self::NoteOff,
            3 => Self::NoteFade,
            _ => Self::Cut,
        }
    }
}

/// Duplicate Check Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DuplicateCheckType {
    /// No duplicate checking
    #[default]
    Off = 0,
    /// Check for same note
    Note = 1,
    /// Check for same sample
    Sample = 2,
    /// Check for same instrument
    Instrument = 3,
}

impl DuplicateCheckType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Note,
            2 => Self::Sample,
            3 => Self::Instrument,
            _ => Self::Off,
        }
    }
}

/// Duplicate Check Action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DuplicateCheckAction {
    /// Cut the duplicate note
    #[default]
    Cut = 0,
    /// Release the duplicate note
    NoteOff = 1,
    /// Fade out the duplicate note
    NoteFade = 2,
}

impl DuplicateCheckAction {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::NoteOff,
            2 => Self::NoteFade,
            _ => Self::Cut,
        }
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// One envelope node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Position in ticks from note start
    pub tick: u16,
    /// Value at this node
    pub value: i8,
}

/// Piecewise-linear envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Nodes in ascending tick order
    pub points: Vec<EnvelopePoint>,
    /// Loop range as node indices (inclusive)
    pub loop_range: Option<(u8, u8)>,
    /// Sustain range as node indices (inclusive), held until release
    pub sustain_range: Option<(u8, u8)>,
    /// Whether the envelope is applied
    pub enabled: bool,
    /// Keep the envelope position when a new note starts (IT carry)
    pub carry: bool,
}

impl Envelope {
    /// Build an envelope, dropping out-of-order nodes and invalid ranges
    pub fn sanitized(
        mut points: Vec<EnvelopePoint>,
        loop_range: Option<(u8, u8)>,
        sustain_range: Option<(u8, u8)>,
        enabled: bool,
    ) -> Self {
        let mut last_tick = None;
        points.retain(|point| {
            let keep = last_tick.is_none_or(|last| point.tick > last);
            if keep {
                last_tick = Some(point.tick);
            }
            keep
        });
        let count = points.len();
        let valid = |range: Option<(u8, u8)>| {
            range.filter(|&(start, end)| start <= end && (end as usize) < count)
        };
        Self {
            loop_range: valid(loop_range),
            sustain_range: valid(sustain_range),
            enabled: enabled && count > 0,
            points,
            carry: false,
        }
    }

    /// Tick position of the node at `index`
    pub fn tick_of(&self, index: u8) -> Option<u16> {
        self.points.get(index as usize).map(|point| point.tick)
    }

    /// Tick of the final node
    pub fn last_tick(&self) -> u16 {
        self.points.last().map_or(0, |point| point.tick)
    }

    /// Interpolated value at a given tick
    pub fn value_at(&self, tick: u16) -> i8 {
        let Some(first) = self.points.first() else {
            return 0;
        };
        if tick <= first.tick {
            return first.value;
        }

        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if tick >= a.tick && tick < b.tick {
                let dx = i32::from(b.tick - a.tick);
                let dy = i32::from(b.value) - i32::from(a.value);
                let t = i32::from(tick - a.tick);
                return (i32::from(a.value) + dy * t / dx) as i8;
            }
        }

        self.points.last().map_or(0, |point| point.value)
    }
}
