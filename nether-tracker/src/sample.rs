//! Sample descriptors
//!
//! Payload bytes are opaque here. Only the length and loop metadata take part
//! in sequencing decisions; the encoding tells a downstream renderer how to
//! read the payload.

use crate::ledger::{LedgerToken, ResourceLedger};

/// Unified sample descriptor
#[derive(Debug, Clone)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Length in frames
    pub length: u32,
    /// Regular loop (played after release too)
    pub looping: SampleLoop,
    /// Sustain loop (played until the note is released)
    pub sustain: SampleLoop,
    /// Storage layout of the payload
    pub format: SampleFormat,
    /// Playback rate of middle C in Hz
    pub c_rate: u32,
    /// Raw sample bytes
    pub payload: SamplePayload,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: String::new(),
            length: 0,
            looping: SampleLoop::NONE,
            sustain: SampleLoop::NONE,
            format: SampleFormat::default(),
            c_rate: crate::DEFAULT_C_RATE,
            payload: SamplePayload::default(),
        }
    }
}

impl Sample {
    /// A sample with no frames never produces sound
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Frame index playback stops at (or loops back from) when nothing is released
    pub fn end_frame(&self) -> u32 {
        if self.looping.is_active() {
            self.looping.end
        } else {
            self.length
        }
    }
}

/// Loop direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// No loop
    #[default]
    None,
    /// Forward loop
    Forward,
    /// Ping-pong (bidirectional) loop
    PingPong,
}

/// Loop points in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleLoop {
    /// Loop direction
    pub mode: LoopMode,
    /// First frame of the loop
    pub start: u32,
    /// Frame after the last looped frame
    pub end: u32,
}

impl SampleLoop {
    pub const NONE: Self = Self {
        mode: LoopMode::None,
        start: 0,
        end: 0,
    };

    /// Build a loop clamped to `length`; degenerate ranges disable the loop
    pub fn clamped(mode: LoopMode, start: u32, end: u32, length: u32) -> Self {
        let end = end.min(length);
        if mode == LoopMode::None || start >= end {
            return Self::NONE;
        }
        Self { mode, start, end }
    }

    pub fn is_active(&self) -> bool {
        self.mode != LoopMode::None
    }
}

/// How payload frames are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleEncoding {
    /// Signed PCM
    #[default]
    SignedPcm,
    /// Unsigned PCM (S3M default, IT with the signed flag clear)
    UnsignedPcm,
    /// Delta-encoded signed PCM (XM, IT "delta" flag)
    DeltaPcm,
    /// IT 2.14/2.15 block compression, kept undecoded
    It215,
    /// ModPlug 4-bit ADPCM, kept undecoded
    Adpcm4,
}

/// Storage layout of a sample payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    /// Bits per channel sample (8 or 16)
    pub bits: u8,
    /// Interleaved left/right frames
    pub stereo: bool,
    /// Byte-level encoding
    pub encoding: SampleEncoding,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            bits: 8,
            stereo: false,
            encoding: SampleEncoding::SignedPcm,
        }
    }
}

impl SampleFormat {
    /// Bytes occupied by `frames` frames of plain PCM in this layout
    pub fn byte_len(&self, frames: u32) -> Option<u64> {
        let bytes_per_frame = u64::from(self.bits / 8) * if self.stereo { 2 } else { 1 };
        u64::from(frames).checked_mul(bytes_per_frame)
    }
}

/// Opaque sample bytes
///
/// Each payload is an independent owner of its storage. When a ledger is
/// attached, the payload counts as one allocation until dropped.
#[derive(Debug, Clone, Default)]
pub struct SamplePayload {
    bytes: Vec<u8>,
    _token: Option<LedgerToken>,
}

impl SamplePayload {
    pub fn new(bytes: Vec<u8>, ledger: Option<&ResourceLedger>) -> Self {
        Self {
            bytes,
            _token: ledger.map(ResourceLedger::register),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
