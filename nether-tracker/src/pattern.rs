//! Pattern grids and events

use crate::builder::ModelError;
use crate::effects::Effect;
use crate::{InstrumentId, MAX_NOTE};

/// Note column content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Note {
    /// No note on this row
    #[default]
    None,
    /// Play note (0-119, 60 = middle C)
    On(u8),
    /// Release the note (key off)
    Off,
    /// Silence immediately
    Cut,
    /// Start the instrument fadeout
    Fade,
}

impl Note {
    /// Build a note, mapping anything above B-9 to `None`
    pub fn on(note: u8) -> Self {
        if note <= MAX_NOTE {
            Note::On(note)
        } else {
            Note::None
        }
    }

    pub fn pitch(&self) -> Option<u8> {
        match self {
            Note::On(note) => Some(*note),
            _ => None,
        }
    }
}

/// One pattern cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    /// Note column
    pub note: Note,
    /// Instrument column
    pub instrument: Option<InstrumentId>,
    /// Raw volume column byte, decoded per the module's volume-column quirk
    pub volume: Option<u8>,
    /// Effect columns
    pub effects: [Effect; 2],
}

impl Event {
    pub const EMPTY: Self = Self {
        note: Note::None,
        instrument: None,
        volume: None,
        effects: [Effect::None, Effect::None],
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Whether either effect column carries a tone portamento
    pub fn has_tone_porta(&self) -> bool {
        self.effects.iter().any(Effect::is_tone_porta)
    }
}

/// Fixed-size grid of events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    rows: u16,
    channels: u8,
    events: Vec<Event>,
}

impl Pattern {
    /// Empty pattern; dimensions never change afterwards
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            events: vec![Event::EMPTY; rows as usize * channels as usize],
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Event at (row, channel), `None` outside the grid
    pub fn event(&self, row: u16, channel: u8) -> Option<&Event> {
        if row >= self.rows || channel >= self.channels {
            return None;
        }
        self.events
            .get(row as usize * self.channels as usize + channel as usize)
    }

    /// Store an event; writes outside the grid are rejected
    pub fn set(&mut self, row: u16, channel: u8, event: Event) -> Result<(), ModelError> {
        if row >= self.rows || channel >= self.channels {
            return Err(ModelError::CellOutOfRange {
                row,
                channel,
                rows: self.rows,
                channels: self.channels,
            });
        }
        let index = row as usize * self.channels as usize + channel as usize;
        self.events[index] = event;
        Ok(())
    }

    /// Events of one row, in channel order
    pub fn row(&self, row: u16) -> &[Event] {
        if row >= self.rows {
            return &[];
        }
        let width = self.channels as usize;
        let start = row as usize * width;
        &self.events[start..start + width]
    }

    pub(crate) fn events_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut()
    }
}
