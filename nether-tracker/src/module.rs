//! The loaded module and its global metadata

use std::fmt;

use crate::instrument::Instrument;
use crate::ledger::LedgerToken;
use crate::pattern::Pattern;
use crate::quirks::{DialectFlags, Quirks};
use crate::sample::Sample;
use crate::{InstrumentId, PatternId, SampleId};

/// Format family a module was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatId {
    /// ProTracker MOD and its Soundtracker / multichannel variants
    ProTracker,
    /// Scream Tracker 3 S3M
    ScreamTracker3,
    /// FastTracker 2 XM
    FastTracker2,
    /// Impulse Tracker IT
    ImpulseTracker,
    /// Galaxy Music System 4.0 (RIFF AMFF)
    Galaxy4,
}

impl FormatId {
    pub fn name(&self) -> &'static str {
        match self {
            FormatId::ProTracker => "Protracker",
            FormatId::ScreamTracker3 => "Scream Tracker 3",
            FormatId::FastTracker2 => "Fast Tracker II",
            FormatId::ImpulseTracker => "Impulse Tracker",
            FormatId::Galaxy4 => "Galaxy Music System 4.0",
        }
    }
}

/// Detected format and dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    /// Format family
    pub id: FormatId,
    /// Name of the program that wrote the file, as far as it can be told
    pub tracker: String,
    /// Sub-dialect markers
    pub dialect: DialectFlags,
}

impl FormatInfo {
    pub fn new(id: FormatId) -> Self {
        Self {
            id,
            tracker: id.name().to_string(),
            dialect: DialectFlags::empty(),
        }
    }
}

/// Pitch slide arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodMode {
    /// Amiga periods (slides get finer as pitch rises)
    #[default]
    Amiga,
    /// Linear periods (64 units per semitone)
    Linear,
}

/// Global song parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHeader {
    /// Number of song channels
    pub channels: u8,
    /// Initial speed (ticks per row)
    pub initial_speed: u8,
    /// Initial tempo (BPM)
    pub initial_tempo: u8,
    /// Initial global volume (0-128)
    pub global_volume: u8,
    /// Mixing volume (0-128)
    pub mix_volume: u8,
    /// Order position the song continues at after the last order
    pub restart_position: u16,
    /// Pitch slide arithmetic
    pub period_mode: PeriodMode,
    /// Initial pan per channel (0-255, 128 = centre)
    pub channel_pan: Vec<u8>,
    /// Initial channel volume per channel (0-64)
    pub channel_volume: Vec<u8>,
}

impl ModuleHeader {
    /// Header with neutral defaults for `channels` channels
    pub fn new(channels: u8) -> Self {
        Self {
            channels,
            initial_speed: 6,
            initial_tempo: 125,
            global_volume: 128,
            mix_volume: 128,
            restart_position: 0,
            period_mode: PeriodMode::Amiga,
            channel_pan: vec![128; channels as usize],
            channel_volume: vec![64; channels as usize],
        }
    }

    pub fn uses_linear_periods(&self) -> bool {
        self.period_mode == PeriodMode::Linear
    }
}

/// One order list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Play this pattern
    Pattern(PatternId),
    /// Marker skipped during playback ("+++")
    Skip,
    /// End of song ("---")
    End,
}

/// A recognized feature the engine leaves inert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFeature {
    /// Short feature name
    pub feature: &'static str,
    /// Where it was found
    pub detail: String,
}

impl fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.feature, self.detail)
    }
}

/// Unified, immutable tracker module
///
/// Built through [`crate::ModuleBuilder`]. After `build()` every instrument,
/// sample, and pattern reference held anywhere in the module indexes an
/// existing entity.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) title: String,
    pub(crate) format: FormatInfo,
    pub(crate) header: ModuleHeader,
    pub(crate) orders: Vec<Order>,
    pub(crate) patterns: Vec<Pattern>,
    pub(crate) instruments: Vec<Instrument>,
    pub(crate) samples: Vec<Sample>,
    pub(crate) quirks: Quirks,
    pub(crate) message: Option<String>,
    pub(crate) unsupported: Vec<UnsupportedFeature>,
    pub(crate) _instrument_tokens: Vec<Option<LedgerToken>>,
}

impl Module {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn format(&self) -> &FormatInfo {
        &self.format
    }

    pub fn header(&self) -> &ModuleHeader {
        &self.header
    }

    pub fn channels(&self) -> u8 {
        self.header.channels
    }

    pub fn quirks(&self) -> &Quirks {
        &self.quirks
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Features recognized at load time but left inert
    pub fn unsupported(&self) -> &[UnsupportedFeature] {
        &self.unsupported
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, position: u16) -> Option<Order> {
        self.orders.get(position as usize).copied()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(id.index())
    }

    /// Pattern played at an order position, `None` for markers and bad entries
    pub fn pattern_at_order(&self, position: u16) -> Option<(PatternId, &Pattern)> {
        match self.order(position)? {
            Order::Pattern(id) => self.pattern(id).map(|pattern| (id, pattern)),
            Order::Skip | Order::End => None,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id.index())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample(&self, id: SampleId) -> Option<&Sample> {
        self.samples.get(id.index())
    }

    /// Sample an instrument plays for `note`, with the transposed note
    pub fn sample_for(&self, instrument: InstrumentId, note: u8) -> Option<(SampleId, u8)> {
        let ins = self.instrument(instrument)?;
        let (sub, played) = ins.resolve(note)?;
        let sample = ins.subinstruments.get(sub)?.sample?;
        self.sample(sample)?;
        Some((sample, played))
    }

    /// Change the default volume of an existing sub-instrument
    ///
    /// This is the only mutation a built module accepts. Returns `false` when
    /// the instrument or sub-instrument does not exist.
    pub fn set_instrument_volume(&mut self, instrument: InstrumentId, sub: usize, volume: u8) -> bool {
        match self
            .instruments
            .get_mut(instrument.index())
            .and_then(|ins| ins.subinstruments.get_mut(sub))
        {
            Some(sub) => {
                sub.volume = volume.min(64);
                true
            }
            None => false,
        }
    }
}
