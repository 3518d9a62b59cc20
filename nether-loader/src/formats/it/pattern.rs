//! IT packed pattern decoding
//!
//! Each cell starts with a channel byte. Bit 7 says a new mask byte follows;
//! otherwise the channel's previous mask is reused. Mask bits 0-3 announce
//! fresh note / instrument / volume / effect values, bits 4-7 repeat the
//! channel's previous ones.

use nether_tracker::{Effect, Event, InstrumentId, ModuleBuilder, Note, Pattern};

use crate::error::FormatError;
use crate::formats::s3m::effects::{self, Flavor};
use crate::reader::ByteReader;

const MAX_CHANNELS: usize = 64;
const DEFAULT_ROWS: u16 = 64;

/// One decoded but not yet converted cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct RawCell {
    note: Option<u8>,
    instrument: Option<u8>,
    volume: Option<u8>,
    effect: Option<(u8, u8)>,
}

/// A pattern as stored, before the song's channel count is known
#[derive(Debug, Clone)]
pub(super) struct RawPattern {
    rows: u16,
    cells: Vec<(u16, u8, RawCell)>,
}

impl RawPattern {
    pub(super) fn highest_channel(&self) -> Option<u8> {
        self.cells.iter().map(|&(_, channel, _)| channel).max()
    }

    /// Convert into a model pattern, noting effects left inert
    pub(super) fn into_pattern(
        self,
        builder: &mut ModuleBuilder,
        index: usize,
    ) -> Result<Pattern, FormatError> {
        let mut pattern = builder.new_pattern(self.rows as usize, builder.channels())?;
        for (row, channel, cell) in self.cells {
            let (event, unsupported) = convert_cell(cell);
            if let Some(feature) = unsupported {
                builder.note_unsupported(feature, format!("pattern {} row {}", index, row));
            }
            pattern.set(row, channel, event)?;
        }
        Ok(pattern)
    }
}

/// Read the pattern at `offset`; zero is an empty 64-row pattern
pub(super) fn read_raw(data: &[u8], offset: u64) -> Result<RawPattern, FormatError> {
    if offset == 0 {
        return Ok(RawPattern {
            rows: DEFAULT_ROWS,
            cells: Vec::new(),
        });
    }

    let mut r = ByteReader::at(data, offset)?;
    let packed_length = r.u16_le()? as usize;
    let rows = r.u16_le()?;
    r.skip(4)?;
    let mut packed = r.sub(packed_length)?;

    let mut masks = [0u8; MAX_CHANNELS];
    let mut last = [RawCell::default(); MAX_CHANNELS];
    let mut cells = Vec::new();
    let mut row = 0u16;

    while row < rows && packed.remaining() > 0 {
        let marker = packed.u8()?;
        if marker == 0 {
            row += 1;
            continue;
        }
        let channel = usize::from((marker - 1) & 0x3F);
        if marker & 0x80 != 0 {
            masks[channel] = packed.u8()?;
        }
        let mask = masks[channel];
        let previous = &mut last[channel];
        let mut cell = RawCell::default();

        if mask & 0x01 != 0 {
            previous.note = Some(packed.u8()?);
        }
        if mask & 0x02 != 0 {
            previous.instrument = Some(packed.u8()?);
        }
        if mask & 0x04 != 0 {
            previous.volume = Some(packed.u8()?);
        }
        if mask & 0x08 != 0 {
            previous.effect = Some((packed.u8()?, packed.u8()?));
        }
        if mask & 0x11 != 0 {
            cell.note = previous.note;
        }
        if mask & 0x22 != 0 {
            cell.instrument = previous.instrument;
        }
        if mask & 0x44 != 0 {
            cell.volume = previous.volume;
        }
        if mask & 0x88 != 0 {
            cell.effect = previous.effect;
        }
        cells.push((row, channel as u8, cell));
    }

    Ok(RawPattern { rows, cells })
}

fn convert_cell(cell: RawCell) -> (Event, Option<&'static str>) {
    let (effect, unsupported) = match cell.effect {
        Some((command, param)) => match effects::convert(command, param, Flavor::It) {
            Ok(effect) => (effect, None),
            Err(feature) => (Effect::None, Some(feature)),
        },
        None => (Effect::None, None),
    };
    let event = Event {
        note: match cell.note {
            None => Note::None,
            Some(255) => Note::Off,
            Some(254) => Note::Cut,
            Some(n) if n <= nether_tracker::MAX_NOTE => Note::On(n),
            Some(_) => Note::Fade,
        },
        instrument: cell
            .instrument
            .filter(|&i| i > 0)
            .map(|i| InstrumentId(u16::from(i) - 1)),
        volume: cell.volume,
        effects: [effect, Effect::None],
    };
    (event, unsupported)
}
