//! FastTracker 2 XM loader
//!
//! Version 0x0104 files store patterns first, then each instrument followed by
//! its sample data. Versions 0x0102/0x0103 store instrument headers before the
//! patterns and all sample data at the end.

mod instrument;

use nether_tracker::{
    DialectFlags, Effect, Event, FormatId, FormatInfo, InstrumentDraft, InstrumentId,
    ModuleBuilder, Note, Order, Pattern, PatternId, PeriodMode,
};

use crate::error::{FormatError, structure};
use crate::formats::protracker::effects;
use crate::reader::{ByteReader, slice_at};
use crate::{Format, LoadOptions};

use instrument::PendingInstrument;

pub(crate) const XM_MAGIC: &[u8; 17] = b"Extended Module: ";
const HEADER_FIELD_OFFSET: u64 = 60;
const NOTE_KEY_OFF: u8 = 97;

pub(crate) fn probe(data: &[u8]) -> bool {
    slice_at(data, 0, 17) == Some(XM_MAGIC)
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    if !probe(data) {
        return Err(FormatError::NotThisFormat);
    }

    let mut r = ByteReader::at(data, 17)?;

    // Module name (20 bytes) and 0x1A marker
    let title = r.string(20)?;
    r.skip(1)?;

    // Tracker name (20 bytes)
    let tracker = r.string(20)?;

    // Version (2 bytes)
    let version = r.u16_le()?;
    if !(0x0102..=0x0104).contains(&version) {
        return Err(structure(format!("unsupported XM version {:#06x}", version)));
    }

    // Header size, measured from the position of the size field itself
    let header_size = r.u32_le()?;
    let song_length = r.u16_le()? as usize;
    let restart_position = r.u16_le()?;
    let channels = r.u16_le()? as usize;
    let pattern_count = r.u16_le()? as usize;
    let instrument_count = r.u16_le()? as usize;
    let flags = r.u16_le()?;
    let speed = r.u16_le()?;
    let bpm = r.u16_le()?;
    let orders = r.bytes(256)?;
    if song_length > 256 {
        return Err(structure(format!("song length {} exceeds 256", song_length)));
    }

    let mut info = FormatInfo::new(FormatId::FastTracker2);
    if tracker.starts_with("OpenMPT") || tracker.starts_with("ModPlug") {
        info.dialect |= DialectFlags::MODPLUG;
    }
    if !tracker.is_empty() {
        info.tracker = tracker;
    }
    let mut builder = options.builder(info, channels)?;
    builder.set_title(title);

    let header = builder.header_mut();
    header.restart_position = restart_position;
    header.initial_speed = speed.min(255) as u8;
    header.initial_tempo = bpm.min(255) as u8;
    header.period_mode = if flags & 1 != 0 {
        PeriodMode::Linear
    } else {
        PeriodMode::Amiga
    };
    builder.set_orders(
        orders[..song_length]
            .iter()
            .map(|&p| Order::Pattern(PatternId(u16::from(p))))
            .collect(),
    )?;

    r.seek(HEADER_FIELD_OFFSET + u64::from(header_size))?;
    let policy = options.duplicate_policy_for(Format::Xm);

    if version >= 0x0104 {
        read_patterns(&mut r, &mut builder, pattern_count, version)?;
        for index in 0..instrument_count {
            let pending = instrument::read_header(&mut r, &mut builder)?;
            let draft = pending.read_samples(&mut r, &mut builder)?;
            builder.insert_instrument(index as u16, draft, policy)?;
        }
    } else {
        let mut pending: Vec<PendingInstrument> = Vec::with_capacity(instrument_count);
        for _ in 0..instrument_count {
            pending.push(instrument::read_header(&mut r, &mut builder)?);
        }
        read_patterns(&mut r, &mut builder, pattern_count, version)?;
        for (index, instrument) in pending.into_iter().enumerate() {
            let draft: InstrumentDraft = instrument.read_samples(&mut r, &mut builder)?;
            builder.insert_instrument(index as u16, draft, policy)?;
        }
    }

    Ok(builder)
}

fn read_patterns(
    r: &mut ByteReader<'_>,
    builder: &mut ModuleBuilder,
    count: usize,
    version: u16,
) -> Result<(), FormatError> {
    for index in 0..count {
        let pattern = read_pattern(r, builder, index, version)?;
        builder.add_pattern(pattern)?;
    }
    Ok(())
}

/// Read one pattern header and its packed data
fn read_pattern(
    r: &mut ByteReader<'_>,
    builder: &mut ModuleBuilder,
    index: usize,
    version: u16,
) -> Result<Pattern, FormatError> {
    // Header length includes the 4-byte length field itself
    let header_start = r.position() as u64;
    let header_length = r.u32_le()?;

    // Packing type (1 byte), always 0
    r.skip(1)?;

    let rows = if version == 0x0102 {
        usize::from(r.u8()?) + 1
    } else {
        r.u16_le()? as usize
    };
    let packed_size = r.u16_le()? as usize;
    r.seek(header_start + u64::from(header_length))?;

    // Zero rows is stored by some writers for an empty 64-row pattern
    let rows = if rows == 0 { 64 } else { rows };
    let channels = builder.channels();
    let mut pattern = builder.new_pattern(rows, channels)?;
    if packed_size == 0 {
        return Ok(pattern);
    }

    let mut packed = r.sub(packed_size)?;
    for row in 0..rows as u16 {
        for channel in 0..channels {
            let cell = unpack_cell(&mut packed)?;
            let (event, unsupported) = decode_cell(cell);
            if let Some(feature) = unsupported {
                builder.note_unsupported(feature, format!("pattern {} row {}", index, row));
            }
            pattern.set(row, channel, event)?;
        }
    }
    Ok(pattern)
}

/// Raw cell fields: note, instrument, volume, effect, parameter
type RawCell = [u8; 5];

/// Unpack one cell
///
/// A first byte with the high bit set is a mask of the fields that follow;
/// otherwise the cell is stored as five plain bytes.
fn unpack_cell(r: &mut ByteReader<'_>) -> Result<RawCell, FormatError> {
    let first = r.u8()?;
    let mut cell = [0u8; 5];
    if first & 0x80 != 0 {
        for (bit, field) in cell.iter_mut().enumerate() {
            if first & (1 << bit) != 0 {
                *field = r.u8()?;
            }
        }
    } else {
        cell[0] = first;
        cell[1..].copy_from_slice(r.bytes(4)?);
    }
    Ok(cell)
}

fn decode_cell(cell: RawCell) -> (Event, Option<&'static str>) {
    let [note, instrument, volume, fx, param] = cell;
    let (effect, unsupported) = match effects::convert(fx, param) {
        Ok(effect) => (effect, None),
        Err(feature) => (Effect::None, Some(feature)),
    };
    let event = Event {
        note: match note {
            0 => Note::None,
            NOTE_KEY_OFF => Note::Off,
            n if n < NOTE_KEY_OFF => Note::on(n - 1),
            _ => Note::None,
        },
        instrument: (instrument > 0).then(|| InstrumentId(u16::from(instrument) - 1)),
        volume: (volume >= 0x10).then_some(volume),
        effects: [effect, Effect::None],
    };
    (event, unsupported)
}
