//! Per-channel, per-tick output of the sequencer
//!
//! An intent describes what one song channel wants to hear at the end of a
//! tick. The voice allocator turns intents into voice commands; raw pattern
//! events never reach it.

use nether_tracker::{EnvelopeToggle, InstrumentId, NewNoteAction, PastNoteAction, SampleId};

/// Note-level request carried by an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteAction {
    /// Keep whatever the channel's voice is doing
    #[default]
    Unchanged,
    /// Start the channel's note from `offset` frames, displacing its current voice
    Start { offset: u32 },
    /// Restart the sample on the channel's current voice (no new note action)
    Retrigger,
    /// Key off: leave sustain, start the fadeout
    Release,
    /// Start the fadeout without leaving sustain
    Fade,
    /// Silence immediately
    Cut,
}

/// Envelope changes requested by the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvelopeControl {
    /// Restart every envelope and the fade counter without restarting the sample
    pub reset: bool,
    /// Move the volume envelope to this tick
    pub position: Option<u16>,
    /// Switch one envelope on or off
    pub toggle: Option<EnvelopeToggle>,
}

impl EnvelopeControl {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What one song channel asks for this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelIntent {
    /// Song channel
    pub channel: u8,
    /// Note-level request
    pub action: NoteAction,
    /// Note handed to the sample (after keymap transposition)
    pub note: Option<u8>,
    /// Instrument logically playing on the channel
    pub instrument: Option<InstrumentId>,
    /// Sample the channel plays
    pub sample: Option<SampleId>,
    /// Current period, vibrato and arpeggio included
    pub period: i32,
    /// Note volume at internal resolution (0-1024)
    pub volume: u16,
    /// Channel volume (0-64)
    pub channel_volume: u8,
    /// Panning (0-255, 128 = centre)
    pub pan: u8,
    /// New note action of the channel's current note
    pub nna: NewNoteAction,
    /// Action on voices this channel left playing in the background
    pub past_note: Option<PastNoteAction>,
    /// Envelope changes
    pub envelopes: EnvelopeControl,
}

impl ChannelIntent {
    /// Intent of a channel with nothing to say
    pub fn idle(channel: u8) -> Self {
        Self {
            channel,
            action: NoteAction::Unchanged,
            note: None,
            instrument: None,
            sample: None,
            period: 0,
            volume: 0,
            channel_volume: 64,
            pan: 128,
            nna: NewNoteAction::Cut,
            past_note: None,
            envelopes: EnvelopeControl::default(),
        }
    }

    pub fn starts_note(&self) -> bool {
        matches!(self.action, NoteAction::Start { .. })
    }
}
