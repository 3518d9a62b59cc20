//! Synthetic modules for unit tests

use nether_tracker::{
    Effect, Envelope, EnvelopePoint, Event, FormatId, FormatInfo, Instrument, InstrumentDraft,
    InstrumentId, Limits, Module, ModuleBuilder, Note, Order, PeriodMode, Sample, SampleId,
    SamplePayload, SubInstrument,
};

/// Silent sample of `frames` frames
pub(crate) fn sample(frames: u32) -> Sample {
    Sample {
        name: "smp".to_string(),
        length: frames,
        payload: SamplePayload::new(vec![0; frames as usize], None),
        ..Sample::default()
    }
}

/// Instrument playing bank sample `sample` on every note at `volume`
pub(crate) fn instrument(sample: u16, volume: u8) -> Instrument {
    Instrument::single(
        "ins",
        SubInstrument {
            sample: Some(SampleId(sample)),
            volume,
            ..SubInstrument::default()
        },
    )
}

/// Sustained volume envelope (0-64 over ten ticks, sustain on the last node)
pub(crate) fn sustain_envelope() -> Envelope {
    Envelope::sanitized(
        vec![
            EnvelopePoint { tick: 0, value: 0 },
            EnvelopePoint { tick: 10, value: 64 },
        ],
        None,
        Some((1, 1)),
        true,
    )
}

pub(crate) fn note(note: u8, instrument: u16) -> Event {
    Event {
        note: Note::On(note),
        instrument: Some(InstrumentId(instrument)),
        ..Event::EMPTY
    }
}

pub(crate) fn bare_note(note: u8) -> Event {
    Event {
        note: Note::On(note),
        ..Event::EMPTY
    }
}

pub(crate) fn fx(effect: Effect) -> Event {
    Event {
        effects: [effect, Effect::None],
        ..Event::EMPTY
    }
}

pub(crate) fn with_fx(mut event: Event, effect: Effect) -> Event {
    if event.effects[0] == Effect::None {
        event.effects[0] = effect;
    } else {
        event.effects[1] = effect;
    }
    event
}

/// Declarative module under construction
pub(crate) struct TestSong {
    format: FormatId,
    channels: u8,
    rows: u16,
    speed: u8,
    period_mode: PeriodMode,
    restart: u16,
    patterns: Vec<Vec<(u16, u8, Event)>>,
    orders: Option<Vec<Order>>,
    instruments: Vec<Instrument>,
    samples: Vec<Sample>,
}

impl TestSong {
    pub(crate) fn new(format: FormatId, channels: u8) -> Self {
        Self {
            format,
            channels,
            rows: 4,
            speed: 6,
            period_mode: PeriodMode::Amiga,
            restart: 0,
            patterns: vec![Vec::new()],
            orders: None,
            instruments: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub(crate) fn rows(mut self, rows: u16) -> Self {
        self.rows = rows;
        self
    }

    pub(crate) fn speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    pub(crate) fn linear(mut self) -> Self {
        self.period_mode = PeriodMode::Linear;
        self
    }

    pub(crate) fn restart(mut self, order: u16) -> Self {
        self.restart = order;
        self
    }

    pub(crate) fn sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    pub(crate) fn instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub(crate) fn cell(mut self, pattern: usize, row: u16, channel: u8, event: Event) -> Self {
        if self.patterns.len() <= pattern {
            self.patterns.resize(pattern + 1, Vec::new());
        }
        self.patterns[pattern].push((row, channel, event));
        self
    }

    /// Defaults to every pattern once, in order
    pub(crate) fn orders(mut self, orders: Vec<Order>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub(crate) fn build(self) -> Module {
        let mut builder = ModuleBuilder::new(
            FormatInfo::new(self.format),
            usize::from(self.channels),
            Limits::default(),
        )
        .unwrap();
        {
            let header = builder.header_mut();
            header.initial_speed = self.speed;
            header.period_mode = self.period_mode;
            header.restart_position = self.restart;
        }
        let mut ids = Vec::new();
        for cells in &self.patterns {
            let mut pattern = builder
                .new_pattern(usize::from(self.rows), self.channels)
                .unwrap();
            for &(row, channel, event) in cells {
                pattern.set(row, channel, event).unwrap();
            }
            ids.push(builder.add_pattern(pattern).unwrap());
        }
        for sample in self.samples {
            builder.add_sample(sample).unwrap();
        }
        for instrument in self.instruments {
            builder.add_instrument(InstrumentDraft::banked(instrument)).unwrap();
        }
        let orders = self
            .orders
            .unwrap_or_else(|| ids.into_iter().map(Order::Pattern).collect());
        builder.set_orders(orders).unwrap();
        builder.build().unwrap()
    }
}
