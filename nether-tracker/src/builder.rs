//! Incremental, validated module construction
//!
//! Loaders append patterns, samples and instruments to a [`ModuleBuilder`].
//! Declared dimensions are checked against [`Limits`] before anything is
//! allocated for them. The builder owns everything appended so far: dropping
//! it (for instance on an early `?` return from a parser) releases every
//! partial allocation at once.

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;
use crate::ledger::{LedgerToken, ResourceLedger};
use crate::module::{FormatInfo, Module, ModuleHeader, Order, UnsupportedFeature};
use crate::pattern::Pattern;
use crate::quirks::Quirks;
use crate::sample::Sample;
use crate::{InstrumentId, PatternId, SampleId};

/// Model construction error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("too many channels: {count} (max {max})")]
    TooManyChannels { count: usize, max: u8 },

    #[error("pattern has {rows} rows (max {max})")]
    TooManyRows { rows: usize, max: u16 },

    #[error("pattern is {channels} channels wide but the module has {module_channels}")]
    PatternWidth { channels: u8, module_channels: u8 },

    #[error("too many patterns (max {max})")]
    TooManyPatterns { max: u16 },

    #[error("too many instruments (max {max})")]
    TooManyInstruments { max: u16 },

    #[error("instrument has {count} sub-instruments (max {max})")]
    TooManySubInstruments { count: usize, max: u16 },

    #[error("too many samples (max {max})")]
    TooManySamples { max: u16 },

    #[error("order list has {count} entries (max {max})")]
    TooManyOrders { count: usize, max: u16 },

    #[error("sample declares {frames} frames (max {max})")]
    SampleTooLarge { frames: u64, max: u32 },

    #[error("sample data exceeds the {max} byte budget")]
    SampleBudgetExceeded { max: u64 },

    #[error("cell ({row}, {channel}) outside a {rows}x{channels} pattern")]
    CellOutOfRange {
        row: u16,
        channel: u8,
        rows: u16,
        channels: u8,
    },

    #[error("instrument slot {slot} declared more than once")]
    DuplicateInstrument { slot: u16 },
}

/// Upper bounds applied to declared dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Song channels
    pub max_channels: u8,
    /// Rows per pattern
    pub max_rows: u16,
    /// Patterns per module
    pub max_patterns: u16,
    /// Order list entries
    pub max_orders: u16,
    /// Instruments per module
    pub max_instruments: u16,
    /// Sub-instruments per instrument
    pub max_subinstruments: u16,
    /// Samples per module (bank and instrument-owned together)
    pub max_samples: u16,
    /// Frames per sample
    pub max_sample_frames: u32,
    /// Total payload bytes per module
    pub max_sample_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_channels: 128,
            max_rows: 1024,
            max_patterns: 1024,
            max_orders: 1024,
            max_instruments: 256,
            max_subinstruments: 256,
            max_samples: 4096,
            max_sample_frames: 1 << 26,
            max_sample_bytes: 1 << 30,
        }
    }
}

/// What to do when an instrument slot is declared twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first declaration, discard later ones
    #[default]
    FirstWins,
    /// Replace the earlier declaration
    LastWins,
    /// Fail the load
    Reject,
}

/// Where an instrument's sub-instrument sample references point
#[derive(Debug, Clone, Default)]
pub enum SampleSource {
    /// Into the module-wide sample bank (MOD, S3M, IT)
    #[default]
    Bank,
    /// Into samples owned by this instrument (XM, Galaxy 4.0)
    Owned(Vec<Sample>),
}

/// An instrument not yet placed in a module
#[derive(Debug, Clone)]
pub struct InstrumentDraft {
    /// Instrument definition
    pub instrument: Instrument,
    /// Sample ownership
    pub samples: SampleSource,
}

impl InstrumentDraft {
    pub fn banked(instrument: Instrument) -> Self {
        Self {
            instrument,
            samples: SampleSource::Bank,
        }
    }

    pub fn owned(instrument: Instrument, samples: Vec<Sample>) -> Self {
        Self {
            instrument,
            samples: SampleSource::Owned(samples),
        }
    }

    fn owned_samples(&self) -> &[Sample] {
        match &self.samples {
            SampleSource::Bank => &[],
            SampleSource::Owned(samples) => samples,
        }
    }
}

/// Sample count and payload bytes held by `samples`
fn footprint(samples: &[Sample]) -> (usize, u64) {
    let bytes = samples.iter().map(|sample| sample.payload.len() as u64).sum();
    (samples.len(), bytes)
}

#[derive(Debug)]
struct Slot {
    draft: InstrumentDraft,
    _token: Option<LedgerToken>,
}

/// Module under construction
#[derive(Debug)]
pub struct ModuleBuilder {
    limits: Limits,
    ledger: Option<ResourceLedger>,
    title: String,
    format: FormatInfo,
    header: ModuleHeader,
    orders: Vec<Order>,
    patterns: Vec<Pattern>,
    bank: Vec<Sample>,
    slots: Vec<Option<Slot>>,
    message: Option<String>,
    unsupported: Vec<UnsupportedFeature>,
    sample_count: usize,
    sample_bytes: u64,
}

impl ModuleBuilder {
    /// Start an empty module with `channels` song channels
    pub fn new(format: FormatInfo, channels: usize, limits: Limits) -> Result<Self, ModelError> {
        if channels == 0 || channels > limits.max_channels as usize {
            return Err(ModelError::TooManyChannels {
                count: channels,
                max: limits.max_channels,
            });
        }
        Ok(Self {
            limits,
            ledger: None,
            title: String::new(),
            format,
            header: ModuleHeader::new(channels as u8),
            orders: Vec::new(),
            patterns: Vec::new(),
            bank: Vec::new(),
            slots: Vec::new(),
            message: None,
            unsupported: Vec::new(),
            sample_count: 0,
            sample_bytes: 0,
        })
    }

    /// Count instrument and sample allocations in `ledger`
    pub fn with_ledger(mut self, ledger: Option<ResourceLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> Option<&ResourceLedger> {
        self.ledger.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn channels(&self) -> u8 {
        self.header.channels
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn format_mut(&mut self) -> &mut FormatInfo {
        &mut self.format
    }

    /// Song parameters; the channel count is fixed at construction
    pub fn header_mut(&mut self) -> &mut ModuleHeader {
        &mut self.header
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn instrument_slots(&self) -> usize {
        self.slots.len()
    }

    /// Allocate an empty pattern after checking its declared dimensions
    pub fn new_pattern(&self, rows: usize, channels: u8) -> Result<Pattern, ModelError> {
        if rows == 0 || rows > self.limits.max_rows as usize {
            return Err(ModelError::TooManyRows {
                rows,
                max: self.limits.max_rows,
            });
        }
        if channels > self.header.channels {
            return Err(ModelError::PatternWidth {
                channels,
                module_channels: self.header.channels,
            });
        }
        Ok(Pattern::new(rows as u16, channels))
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> Result<PatternId, ModelError> {
        if self.patterns.len() >= self.limits.max_patterns as usize {
            return Err(ModelError::TooManyPatterns {
                max: self.limits.max_patterns,
            });
        }
        if pattern.channels() > self.header.channels {
            return Err(ModelError::PatternWidth {
                channels: pattern.channels(),
                module_channels: self.header.channels,
            });
        }
        self.patterns.push(pattern);
        Ok(PatternId((self.patterns.len() - 1) as u16))
    }

    pub fn set_orders(&mut self, orders: Vec<Order>) -> Result<(), ModelError> {
        if orders.len() > self.limits.max_orders as usize {
            return Err(ModelError::TooManyOrders {
                count: orders.len(),
                max: self.limits.max_orders,
            });
        }
        self.orders = orders;
        Ok(())
    }

    /// Check a declared sample size before reading its payload
    pub fn check_sample_frames(&self, frames: u64) -> Result<(), ModelError> {
        if frames > u64::from(self.limits.max_sample_frames) {
            return Err(ModelError::SampleTooLarge {
                frames,
                max: self.limits.max_sample_frames,
            });
        }
        Ok(())
    }

    /// Append a sample to the shared bank
    pub fn add_sample(&mut self, sample: Sample) -> Result<SampleId, ModelError> {
        self.account_samples(std::slice::from_ref(&sample))?;
        self.bank.push(sample);
        Ok(SampleId((self.bank.len() - 1) as u16))
    }

    /// Append an instrument at the next free slot
    pub fn add_instrument(&mut self, draft: InstrumentDraft) -> Result<InstrumentId, ModelError> {
        let slot = self.slots.len();
        if slot >= self.limits.max_instruments as usize {
            return Err(ModelError::TooManyInstruments {
                max: self.limits.max_instruments,
            });
        }
        self.insert_instrument(slot as u16, draft, DuplicatePolicy::Reject)
    }

    /// Place an instrument in a declared slot
    ///
    /// A draft that loses under `policy` is dropped before this returns,
    /// releasing every sample it owns.
    pub fn insert_instrument(
        &mut self,
        slot: u16,
        draft: InstrumentDraft,
        policy: DuplicatePolicy,
    ) -> Result<InstrumentId, ModelError> {
        let index = slot as usize;
        if index >= self.limits.max_instruments as usize {
            return Err(ModelError::TooManyInstruments {
                max: self.limits.max_instruments,
            });
        }
        let subs = draft.instrument.subinstruments.len();
        if subs > self.limits.max_subinstruments as usize {
            return Err(ModelError::TooManySubInstruments {
                count: subs,
                max: self.limits.max_subinstruments,
            });
        }

        let occupied = self.slots.get(index).is_some_and(Option::is_some);
        if occupied {
            match policy {
                DuplicatePolicy::Reject => {
                    tracing::warn!("Rejecting duplicate declaration of instrument slot {}", slot);
                    return Err(ModelError::DuplicateInstrument { slot });
                }
                DuplicatePolicy::FirstWins => {
                    tracing::debug!("Discarding duplicate declaration of instrument slot {}", slot);
                    return Ok(InstrumentId(slot));
                }
                DuplicatePolicy::LastWins => {
                    tracing::debug!("Replacing earlier declaration of instrument slot {}", slot);
                }
            }
        }

        let (freed_count, freed_bytes) = self
            .slots
            .get(index)
            .and_then(Option::as_ref)
            .map_or((0, 0), |replaced| footprint(replaced.draft.owned_samples()));
        self.sample_count -= freed_count;
        self.sample_bytes -= freed_bytes;
        if let Err(e) = self.account_samples(draft.owned_samples()) {
            self.sample_count += freed_count;
            self.sample_bytes += freed_bytes;
            return Err(e);
        }
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        // Assigning drops any replaced slot together with its samples
        self.slots[index] = Some(Slot {
            draft,
            _token: self.ledger.as_ref().map(ResourceLedger::register),
        });
        Ok(InstrumentId(slot))
    }

    /// Record a recognized feature that playback leaves inert
    pub fn note_unsupported(&mut self, feature: &'static str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!("Unsupported feature {}: {}", feature, detail);
        if !self
            .unsupported
            .iter()
            .any(|known| known.feature == feature && known.detail == detail)
        {
            self.unsupported.push(UnsupportedFeature { feature, detail });
        }
    }

    fn account_samples(&mut self, samples: &[Sample]) -> Result<(), ModelError> {
        if self.sample_count + samples.len() > self.limits.max_samples as usize {
            return Err(ModelError::TooManySamples {
                max: self.limits.max_samples,
            });
        }
        let mut bytes = self.sample_bytes;
        for sample in samples {
            self.check_sample_frames(u64::from(sample.length))?;
            bytes = bytes
                .checked_add(sample.payload.len() as u64)
                .filter(|&total| total <= self.limits.max_sample_bytes)
                .ok_or(ModelError::SampleBudgetExceeded {
                    max: self.limits.max_sample_bytes,
                })?;
        }
        self.sample_count += samples.len();
        self.sample_bytes = bytes;
        Ok(())
    }

    /// Finish the module, normalizing every dangling reference to "none"
    pub fn build(self) -> Result<Module, ModelError> {
        let ModuleBuilder {
            title,
            format,
            mut header,
            mut orders,
            mut patterns,
            bank,
            slots,
            message,
            unsupported,
            ..
        } = self;

        let bank_len = bank.len();
        let mut samples = bank;
        let mut instruments = Vec::with_capacity(slots.len());
        let mut instrument_tokens = Vec::with_capacity(slots.len());
        let mut dangling = 0usize;

        for (slot_index, slot) in slots.into_iter().enumerate() {
            let Some(Slot { draft, _token }) = slot else {
                instruments.push(Instrument::default());
                instrument_tokens.push(None);
                continue;
            };
            let InstrumentDraft {
                mut instrument,
                samples: source,
            } = draft;

            let (base, available) = match source {
                SampleSource::Bank => (0, bank_len),
                SampleSource::Owned(owned) => {
                    let base = samples.len();
                    let count = owned.len();
                    samples.extend(owned);
                    (base, count)
                }
            };
            for sub in &mut instrument.subinstruments {
                sub.sample = match sub.sample {
                    Some(id) if id.index() < available => Some(SampleId((base + id.index()) as u16)),
                    Some(id) => {
                        tracing::debug!("Instrument {} references missing sample {}", slot_index, id.0);
                        dangling += 1;
                        None
                    }
                    None => None,
                };
            }
            let sub_count = instrument.subinstruments.len();
            for entry in &mut instrument.keymap {
                if entry.sub.is_some_and(|sub| sub as usize >= sub_count) {
                    entry.sub = None;
                    dangling += 1;
                }
            }
            instrument.keymap.resize(crate::NOTE_COUNT, crate::KeymapEntry::UNMAPPED);

            instruments.push(instrument);
            instrument_tokens.push(_token);
        }

        let instrument_count = instruments.len();
        for pattern in &mut patterns {
            for event in pattern.events_mut() {
                if event.instrument.is_some_and(|id| id.index() >= instrument_count) {
                    event.instrument = None;
                    dangling += 1;
                }
            }
        }

        let pattern_count = patterns.len();
        for order in &mut orders {
            if let Order::Pattern(id) = *order
                && id.index() >= pattern_count
            {
                *order = Order::Skip;
                dangling += 1;
            }
        }

        if dangling > 0 {
            tracing::debug!("Normalized {} dangling references to none", dangling);
        }

        if header.restart_position as usize >= orders.len() {
            header.restart_position = 0;
        }
        let channels = header.channels as usize;
        header.channel_pan.resize(channels, 128);
        header.channel_volume.resize(channels, 64);
        header.initial_speed = header.initial_speed.max(1);
        header.initial_tempo = header.initial_tempo.max(32);
        header.global_volume = header.global_volume.min(128);

        let quirks = Quirks::for_format(format.id, format.dialect);
        Ok(Module {
            title,
            format,
            header,
            orders,
            patterns,
            instruments,
            samples,
            quirks,
            message,
            unsupported,
            _instrument_tokens: instrument_tokens,
        })
    }
}
