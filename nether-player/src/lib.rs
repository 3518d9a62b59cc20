//! Nether-Player: tick-driven tracker playback
//!
//! The player replays a [`nether_tracker::Module`] one tick at a time and
//! hands a renderer abstract voice parameters. It never produces audio
//! itself.
//!
//! # Architecture
//!
//! ```text
//!   Arc<Module> ──────────────┬──────────────────────┐
//!                             ▼                      ▼
//!  ┌──────────────────────────────────┐  ┌────────────────────────┐
//!  │ Sequencer                        │  │ VoiceAllocator         │
//!  │  row: notes, instruments,        │  │  channel → voice index │
//!  │       volume column, effects     │─▶│  new note actions      │─▶ VoiceCommand
//!  │  tick: continuing effects        │  │  envelopes, fadeout    │   (renderer)
//!  │  song flow, quirk forks          │  │  free/released/steal   │
//!  └──────────────────────────────────┘  └────────────────────────┘
//!          ChannelIntent per channel          one command per voice
//! ```
//!
//! Everything that differs between source formats is read from the module's
//! [`nether_tracker::Quirks`]; the player does not look at the format id.

mod channel;
mod command;
mod config;
mod intent;
mod player;
mod sequencer;
mod utils;
mod voices;

pub use channel::{ChannelState, ChannelStatus, Oscillator, Tremor, VOLUME_MAX, VOLUME_SCALE};
pub use command::{LoopDescriptor, Position, TickFrame, VoiceAction, VoiceCommand, VoiceId};
pub use config::{ConfigError, MAX_VOICES, PlayerConfig, ReleasedVoicePolicy};
pub use intent::{ChannelIntent, EnvelopeControl, NoteAction};
pub use player::Player;
pub use sequencer::Sequencer;
pub use utils::{note_period, period_frequency, samples_per_tick};
pub use voices::{
    EnvelopeCursor, EnvelopeKind, EnvelopeState, FADE_MAX, MixParams, Voice, VoiceAllocator,
    VoiceState,
};

#[cfg(test)]
pub(crate) mod test_support;
