//! Renderer hand-off
//!
//! A [`TickFrame`] holds everything a renderer needs for one tick: how many
//! output frames the tick lasts and one [`VoiceCommand`] per voice that is
//! sounding or just stopped. Commands carry values, never references into
//! player state, so the renderer can be swapped freely.

use smallvec::SmallVec;

use nether_tracker::{InstrumentId, LoopMode, SampleId};

use crate::intent::ChannelIntent;

/// Physical voice handle (index into the voice pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u16);

impl VoiceId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What the renderer does with a voice this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAction {
    /// Start the sample from `offset` frames
    Start { offset: u32 },
    /// Keep playing with the updated parameters
    Continue,
    /// Keep playing; the note was released (sustain loop left)
    Release,
    /// Stop immediately
    Cut,
    /// The voice finished on its own and is free again
    Idle,
}

/// Loop the renderer applies to the sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopDescriptor {
    pub mode: LoopMode,
    /// First frame of the loop
    pub start: u32,
    /// Frame after the last looped frame
    pub end: u32,
    /// Whether this is the sustain loop (dropped once the note is released)
    pub sustain: bool,
}

/// One voice's parameters for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceCommand {
    pub voice: VoiceId,
    /// Song channel currently driving the voice, `None` once detached
    pub channel: Option<u8>,
    pub action: VoiceAction,
    /// Note handed to the sample
    pub note: Option<u8>,
    /// Period with auto-vibrato, before the pitch envelope
    pub period: i32,
    /// Playback rate in Hz, pitch envelope included
    pub frequency: f32,
    /// Note volume at internal resolution (0-1024)
    pub volume: u16,
    /// Product of channel, global, instrument and sample volume, envelope and fadeout (0.0-1.0)
    pub gain: f32,
    /// Panning (0-255), pan envelope included
    pub pan: u8,
    pub instrument: Option<InstrumentId>,
    pub sample: Option<SampleId>,
    pub loop_descriptor: LoopDescriptor,
}

impl VoiceCommand {
    /// Loudness used to rank voices (0.0-1.0)
    pub fn level(&self) -> f32 {
        self.volume as f32 / 1024.0 * self.gain
    }
}

/// Song position of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub order: u16,
    pub row: u16,
    pub tick: u16,
}

/// Everything produced by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickFrame {
    /// Position the tick was played at
    pub position: Position,
    /// Ticks per row in effect
    pub speed: u8,
    /// Tempo in effect (BPM)
    pub tempo: u8,
    /// Global volume (0-128)
    pub global_volume: u8,
    /// Output frames this tick lasts
    pub samples: u32,
    /// Sequencer output, one per song channel
    pub intents: SmallVec<[ChannelIntent; 32]>,
    /// Allocator output, one per voice that sounds or just stopped
    pub commands: SmallVec<[VoiceCommand; 32]>,
    /// The song has ended; no further ticks produce sound
    pub finished: bool,
}

impl TickFrame {
    pub fn command_for(&self, voice: VoiceId) -> Option<&VoiceCommand> {
        self.commands.iter().find(|command| command.voice == voice)
    }

    /// Command of the voice serving `channel`
    pub fn channel_command(&self, channel: u8) -> Option<&VoiceCommand> {
        self.commands
            .iter()
            .find(|command| command.channel == Some(channel))
    }
}
