//! Per-format playback quirks
//!
//! Every behavioural fork the sequencer takes is decided by a field of
//! [`Quirks`]. The value is chosen once, from the detected format and its
//! dialect flags, and is never mutated afterwards.
//!
//! Tone portamento with an instrument on the row:
//!
//! ```text
//!   Instrument ->   Same     New valid   Invalid
//!   ProTracker      NewVol   NewVol      Cut
//!   ScreamTracker   NewVol   NewVol      Cont
//!   FastTracker 2   OldVol   OldVol      OldVol
//!   Impulse         NewVol   NewVol      Cont
//!   Galaxy 4.0      NewVol   NewVol      Cut
//! ```

use bitflags::bitflags;

use crate::module::FormatId;

bitflags! {
    /// Sub-dialect markers recorded by the loader
    ///
    /// `SAMPLE_MODE`, `SOUNDTRACKER` and `MODPLUG` describe the file for
    /// hosts and never change the quirk set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DialectFlags: u16 {
        /// IT "old effects" (S3M-compatible vibrato depth, offset clamping)
        const OLD_EFFECTS = 1 << 0;
        /// IT "compatible Gxx": tone portamento shares memory with E/F
        const LINK_G_MEMORY = 1 << 1;
        /// IT file without instruments (informational)
        const SAMPLE_MODE = 1 << 2;
        /// ST3 3.00 volume slides on every tick
        const FAST_VOLUME_SLIDES = 1 << 3;
        /// Clamp periods to the Amiga range
        const AMIGA_LIMITS = 1 << 4;
        /// 15-sample Soundtracker module (informational)
        const SOUNDTRACKER = 1 << 5;
        /// Written by ModPlug / OpenMPT (informational)
        const MODPLUG = 1 << 6;
    }
}

bitflags! {
    /// Independent boolean playback rules
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QuirkFlags: u16 {
        /// Clamp periods to the Amiga hardware range
        const AMIGA_LIMITS = 1 << 0;
        /// Volume slides also run on the first tick of a row
        const FAST_VOLUME_SLIDES = 1 << 1;
        /// S3M-style vibrato/tremolo depth and offset handling
        const OLD_EFFECTS = 1 << 2;
        /// One pattern-loop state shared by every channel
        const GLOBAL_PATTERN_LOOP = 1 << 3;
        /// Displaced notes follow the instrument's new note action
        const NEW_NOTE_ACTIONS = 1 << 4;
        /// `xF`/`Fx` and `Ex`/`Fx` slide parameters encode fine slides
        const COMBINED_FINE_SLIDES = 1 << 5;
        /// A new instrument under tone portamento takes effect at the next note
        const PORTA_INSTRUMENT_PENDING = 1 << 6;
        /// Key off silences notes whose instrument has no volume envelope
        const KEYOFF_CUTS_UNENVELOPED = 1 << 7;
        /// An instrument number alone restarts envelopes
        const INSTRUMENT_RESETS_ENVELOPES = 1 << 8;
    }
}

/// What happens to a playing note when an instrument arrives without a retrigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentChange {
    /// Keep playing, volume unchanged
    Continue,
    /// Keep playing, volume reset to the current instrument's default
    OldVolume,
    /// Keep playing, volume set to the new instrument's default
    NewVolume,
    /// Silence the note
    Cut,
}

/// Note with an instrument that cannot play it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInstrument {
    /// Silence the channel
    Cut,
    /// Ignore the event, the current note keeps playing
    Ignore,
}

/// Meaning of the raw volume column byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeColumn {
    /// Format has no volume column
    None,
    /// 0-64 sets the volume, anything else is ignored
    Plain,
    /// FastTracker 2: 0x10-0x50 set volume, 0x60-0xFF secondary effects
    Xm,
    /// Impulse Tracker: 0-64 volume, 128-192 pan, 65-212 secondary effects
    It,
}

/// Scope of "zero parameter reuses the last value"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectMemory {
    /// Every effect remembers its own parameter
    PerEffect,
    /// Pitch slide up/down share one memory
    SharedPitchSlides,
    /// Pitch slides and tone portamento share one memory
    LinkedPortamento,
    /// One memory shared by every slide-like effect (ST3)
    Shared,
}

/// Sample offset past the end of the sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBeyondEnd {
    /// The note is silenced
    Cut,
    /// The offset is dropped and the sample plays from the start
    Ignore,
    /// Playback starts at the last frame
    Clamp,
}

/// Complete quirk set consulted by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// Boolean rules
    pub flags: QuirkFlags,
    /// Tone portamento, same instrument on the row
    pub porta_same_instrument: InstrumentChange,
    /// Tone portamento, different valid instrument on the row
    pub porta_new_instrument: InstrumentChange,
    /// Tone portamento, instrument that cannot play the note
    pub porta_invalid_instrument: InstrumentChange,
    /// Instrument column without a note
    pub instrument_without_note: InstrumentChange,
    /// Note with an instrument that cannot play it
    pub invalid_instrument: InvalidInstrument,
    /// Volume column decoding
    pub volume_column: VolumeColumn,
    /// Effect parameter memory scope
    pub effect_memory: EffectMemory,
    /// Sample offset beyond the sample end
    pub offset_beyond_end: OffsetBeyondEnd,
}

impl Default for Quirks {
    fn default() -> Self {
        Self::for_format(FormatId::ProTracker, DialectFlags::empty())
    }
}

impl Quirks {
    /// Look up the quirk set of a format and sub-dialect
    pub fn for_format(format: FormatId, dialect: DialectFlags) -> Self {
        match format {
            FormatId::ProTracker => Self {
                flags: if dialect.contains(DialectFlags::AMIGA_LIMITS) {
                    QuirkFlags::AMIGA_LIMITS
                } else {
                    QuirkFlags::empty()
                },
                porta_same_instrument: InstrumentChange::NewVolume,
                porta_new_instrument: InstrumentChange::NewVolume,
                porta_invalid_instrument: InstrumentChange::Cut,
                instrument_without_note: InstrumentChange::NewVolume,
                invalid_instrument: InvalidInstrument::Cut,
                volume_column: VolumeColumn::None,
                effect_memory: EffectMemory::PerEffect,
                offset_beyond_end: OffsetBeyondEnd::Cut,
            },
            FormatId::ScreamTracker3 => {
                let mut flags = QuirkFlags::GLOBAL_PATTERN_LOOP | QuirkFlags::COMBINED_FINE_SLIDES;
                if dialect.contains(DialectFlags::FAST_VOLUME_SLIDES) {
                    flags |= QuirkFlags::FAST_VOLUME_SLIDES;
                }
                if dialect.contains(DialectFlags::AMIGA_LIMITS) {
                    flags |= QuirkFlags::AMIGA_LIMITS;
                }
                Self {
                    flags,
                    porta_same_instrument: InstrumentChange::NewVolume,
                    porta_new_instrument: InstrumentChange::NewVolume,
                    porta_invalid_instrument: InstrumentChange::Continue,
                    instrument_without_note: InstrumentChange::NewVolume,
                    invalid_instrument: InvalidInstrument::Ignore,
                    volume_column: VolumeColumn::Plain,
                    effect_memory: EffectMemory::Shared,
                    offset_beyond_end: OffsetBeyondEnd::Ignore,
                }
            }
            FormatId::FastTracker2 => Self {
                flags: QuirkFlags::KEYOFF_CUTS_UNENVELOPED | QuirkFlags::INSTRUMENT_RESETS_ENVELOPES,
                porta_same_instrument: InstrumentChange::OldVolume,
                porta_new_instrument: InstrumentChange::OldVolume,
                porta_invalid_instrument: InstrumentChange::OldVolume,
                instrument_without_note: InstrumentChange::OldVolume,
                invalid_instrument: InvalidInstrument::Cut,
                volume_column: VolumeColumn::Xm,
                effect_memory: EffectMemory::PerEffect,
                offset_beyond_end: OffsetBeyondEnd::Cut,
            },
            FormatId::ImpulseTracker => {
                let mut flags = QuirkFlags::NEW_NOTE_ACTIONS
                    | QuirkFlags::COMBINED_FINE_SLIDES
                    | QuirkFlags::PORTA_INSTRUMENT_PENDING;
                let old_effects = dialect.contains(DialectFlags::OLD_EFFECTS);
                if old_effects {
                    flags |= QuirkFlags::OLD_EFFECTS;
                }
                Self {
                    flags,
                    porta_same_instrument: InstrumentChange::NewVolume,
                    porta_new_instrument: InstrumentChange::NewVolume,
                    porta_invalid_instrument: InstrumentChange::Continue,
                    instrument_without_note: InstrumentChange::NewVolume,
                    invalid_instrument: InvalidInstrument::Cut,
                    volume_column: VolumeColumn::It,
                    effect_memory: if dialect.contains(DialectFlags::LINK_G_MEMORY) {
                        EffectMemory::LinkedPortamento
                    } else {
                        EffectMemory::SharedPitchSlides
                    },
                    offset_beyond_end: if old_effects {
                        OffsetBeyondEnd::Clamp
                    } else {
                        OffsetBeyondEnd::Ignore
                    },
                }
            }
            FormatId::Galaxy4 => Self {
                flags: QuirkFlags::empty(),
                porta_same_instrument: InstrumentChange::NewVolume,
                porta_new_instrument: InstrumentChange::NewVolume,
                porta_invalid_instrument: InstrumentChange::Cut,
                instrument_without_note: InstrumentChange::NewVolume,
                invalid_instrument: InvalidInstrument::Cut,
                volume_column: VolumeColumn::Plain,
                effect_memory: EffectMemory::PerEffect,
                offset_beyond_end: OffsetBeyondEnd::Cut,
            },
        }
    }

    /// Policy for an instrument arriving under tone portamento
    pub fn porta_policy(&self, same: bool, valid: bool) -> InstrumentChange {
        match (valid, same) {
            (false, _) => self.porta_invalid_instrument,
            (true, true) => self.porta_same_instrument,
            (true, false) => self.porta_new_instrument,
        }
    }

    pub fn has(&self, flag: QuirkFlags) -> bool {
        self.flags.contains(flag)
    }
}
