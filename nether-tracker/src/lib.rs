//! Nether-Tracker: unified tracker module model
//!
//! This crate provides the format-agnostic representation that every loader
//! populates and every playback session reads. A [`Module`] is built once
//! through a [`ModuleBuilder`], validated as items are appended, and then
//! shared read-only (typically behind an `Arc`).
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐
//! │  .mod  │ │  .s3m  │ │  .xm   │ │  .it   │ │ .gal4  │
//! └───┬────┘ └───┬────┘ └───┬────┘ └───┬────┘ └───┬────┘
//!     └──────────┴──────────┼──────────┴──────────┘
//!                           ▼
//!                  ModuleBuilder (limits,
//!                  duplicate slot policy)
//!                           │ build()
//!                           ▼
//!     ┌────────────────────────────────────────┐
//!     │            Module (unified)            │
//!     │  - orders / patterns / events          │
//!     │  - instruments → sub-instruments       │
//!     │  - samples (opaque payloads)           │
//!     │  - quirks (immutable policy table)     │
//!     └────────────────────────────────────────┘
//! ```

mod builder;
mod effects;
mod instrument;
mod ledger;
mod module;
mod pattern;
mod quirks;
mod sample;

pub use builder::{
    DuplicatePolicy, InstrumentDraft, Limits, ModelError, ModuleBuilder, SampleSource,
};
pub use effects::{Effect, EnvelopeToggle, PastNoteAction};
pub use instrument::{
    AutoVibrato, DuplicateCheckAction, DuplicateCheckType, Envelope, EnvelopePoint,
    Instrument, KeymapEntry, NewNoteAction, SubInstrument, VibratoWaveform,
};
pub use ledger::{LedgerToken, ResourceLedger};
pub use module::{
    FormatId, FormatInfo, Module, ModuleHeader, Order, PeriodMode, UnsupportedFeature,
};
pub use pattern::{Event, Note, Pattern};
pub use quirks::{
    DialectFlags, EffectMemory, InstrumentChange, InvalidInstrument, OffsetBeyondEnd,
    QuirkFlags, Quirks, VolumeColumn,
};
pub use sample::{LoopMode, Sample, SampleEncoding, SampleFormat, SampleLoop, SamplePayload};

/// Number of addressable notes (C-0 .. B-9)
pub const NOTE_COUNT: usize = 120;

/// Highest playable note number (B-9)
pub const MAX_NOTE: u8 = 119;

/// Middle C as stored in events (C-5 in XM/IT notation, C-4 in MOD notation)
pub const MIDDLE_C: u8 = 60;

/// Default sample playback rate for middle C
pub const DEFAULT_C_RATE: u32 = 8363;

// =============================================================================
// Entity handles
// =============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u16);

        impl $name {
            /// Zero-based position in the owning module's table
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(
    /// Zero-based instrument handle
    InstrumentId
);
entity_id!(
    /// Zero-based sample handle
    SampleId
);
entity_id!(
    /// Zero-based pattern handle
    PatternId
);

#[cfg(test)]
mod tests;
