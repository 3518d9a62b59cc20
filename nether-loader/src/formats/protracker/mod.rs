//! ProTracker MOD loader
//!
//! Handles 31-sample modules identified by the magic at offset 1080
//! (`M.K.`, `FLT4`, `6CHN`, `16CH`, ...) and 15-sample Soundtracker modules,
//! which carry no magic and are accepted only when every header field is
//! plausible.

pub(crate) mod effects;

use nether_tracker::{
    DialectFlags, Event, FormatId, FormatInfo, Instrument, InstrumentDraft, InstrumentId,
    LoopMode, ModuleBuilder, Note, Order, PatternId, Sample, SampleLoop, SubInstrument,
};

use crate::error::{FormatError, structure};
use crate::reader::{ByteReader, read_string, slice_at};
use crate::{Format, LoadOptions};

const MAGIC_OFFSET: usize = 1080;
const SOUNDTRACKER_HEADER: usize = 600;
const ROWS: usize = 64;

/// Period played at note 48, the note that plays at the sample's C rate
const REFERENCE_PERIOD: f64 = 428.0;
const REFERENCE_NOTE: f64 = 48.0;

struct Layout {
    samples: usize,
    channels: usize,
    tracker: &'static str,
    dialect: DialectFlags,
}

/// Channel count and tracker name from the magic at offset 1080
fn layout_from_magic(magic: &[u8]) -> Option<Layout> {
    fn pt(channels: usize, tracker: &'static str) -> Layout {
        Layout {
            samples: 31,
            channels,
            tracker,
            dialect: DialectFlags::empty(),
        }
    }
    match magic {
        b"M.K." | b"M!K!" => Some(Layout {
            dialect: DialectFlags::AMIGA_LIMITS,
            ..pt(4, "Protracker")
        }),
        b"M&K!" | b"N.T." => Some(Layout {
            dialect: DialectFlags::AMIGA_LIMITS,
            ..pt(4, "Noisetracker")
        }),
        b"FLT4" => Some(pt(4, "Startrekker")),
        b"FLT8" => Some(pt(8, "Startrekker")),
        b"OCTA" | b"CD81" => Some(pt(8, "Octalyser")),
        [d, b'C', b'H', b'N'] if d.is_ascii_digit() && *d != b'0' => {
            Some(pt((d - b'0') as usize, "Fast Tracker"))
        }
        [a, b, b'C', b'H' | b'N'] if a.is_ascii_digit() && b.is_ascii_digit() => {
            let channels = ((a - b'0') * 10 + (b - b'0')) as usize;
            (channels > 0).then(|| pt(channels, "Fast Tracker"))
        }
        [b'T', b'D', b'Z', d] if (b'1'..=b'3').contains(d) => {
            Some(pt((d - b'0') as usize, "TakeTracker"))
        }
        _ => None,
    }
}

/// Heuristic check for a 15-sample Soundtracker module
fn looks_like_soundtracker(data: &[u8]) -> bool {
    let Some(header) = slice_at(data, 0, SOUNDTRACKER_HEADER) else {
        return false;
    };
    let text_ok = |bytes: &[u8]| bytes.iter().all(|&b| b == 0 || (0x20..0x7F).contains(&b));
    if !text_ok(&header[..20]) {
        return false;
    }
    for i in 0..15 {
        let base = 20 + i * 30;
        let record = &header[base..base + 30];
        let volume = record[25];
        if !text_ok(&record[..22]) || volume > 64 || record[24] != 0 {
            return false;
        }
    }
    let song_length = header[470];
    if song_length == 0 || song_length > 128 {
        return false;
    }
    let orders = &header[472..600];
    let patterns = orders.iter().max().map_or(0, |&max| max as usize + 1);
    orders.iter().all(|&p| p < 64) && data.len() >= SOUNDTRACKER_HEADER + patterns * ROWS * 4 * 4
}

pub(crate) fn probe(data: &[u8]) -> bool {
    match slice_at(data, MAGIC_OFFSET, 4) {
        Some(magic) if layout_from_magic(magic).is_some() => true,
        _ => looks_like_soundtracker(data),
    }
}

/// Note for an Amiga period (0 = no note)
pub(crate) fn period_to_note(period: u16) -> Note {
    if period == 0 {
        return Note::None;
    }
    let note = REFERENCE_NOTE + 12.0 * (REFERENCE_PERIOD / f64::from(period)).log2();
    let note = note.round();
    if (0.0..=f64::from(nether_tracker::MAX_NOTE)).contains(&note) {
        Note::On(note as u8)
    } else {
        Note::None
    }
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    let layout = match slice_at(data, MAGIC_OFFSET, 4).and_then(layout_from_magic) {
        Some(layout) => layout,
        None if looks_like_soundtracker(data) => Layout {
            samples: 15,
            channels: 4,
            tracker: "Soundtracker",
            dialect: DialectFlags::SOUNDTRACKER | DialectFlags::AMIGA_LIMITS,
        },
        None => return Err(FormatError::NotThisFormat),
    };

    let mut info = FormatInfo::new(FormatId::ProTracker);
    info.tracker = layout.tracker.to_string();
    info.dialect = layout.dialect;
    let mut builder = options.builder(info, layout.channels)?;

    let mut r = ByteReader::new(data);
    builder.set_title(r.string(20)?);

    // Sample headers
    let mut headers = Vec::with_capacity(layout.samples);
    for _ in 0..layout.samples {
        headers.push(read_sample_header(&mut r)?);
    }

    let song_length = r.u8()? as usize;
    let restart = r.u8()?;
    let orders = r.bytes(128)?;
    if layout.samples == 31 {
        r.skip(4)?; // magic
    }
    if song_length == 0 || song_length > 128 {
        return Err(structure(format!("song length {} outside 1-128", song_length)));
    }

    let pattern_count = orders.iter().max().map_or(0, |&max| max as usize + 1);
    let header = builder.header_mut();
    header.restart_position = if (restart as usize) < song_length { u16::from(restart) } else { 0 };
    for (channel, pan) in header.channel_pan.iter_mut().enumerate() {
        // Amiga LRRL
        *pan = if matches!(channel % 4, 0 | 3) { 64 } else { 192 };
    }
    builder.set_orders(
        orders[..song_length]
            .iter()
            .map(|&p| Order::Pattern(PatternId(u16::from(p))))
            .collect(),
    )?;

    // Patterns
    for _ in 0..pattern_count {
        let mut pattern = builder.new_pattern(ROWS, layout.channels as u8)?;
        for row in 0..ROWS as u16 {
            for channel in 0..layout.channels as u8 {
                let cell = r.bytes(4)?;
                let (event, unsupported) = decode_cell(cell);
                if let Some(feature) = unsupported {
                    builder.note_unsupported(feature, format!("row {} channel {}", row, channel));
                }
                pattern.set(row, channel, event)?;
            }
        }
        builder.add_pattern(pattern)?;
    }

    // Sample data, one instrument per sample
    for (index, header) in headers.into_iter().enumerate() {
        let SampleHeader {
            name,
            length,
            finetune,
            volume,
            loop_start,
            loop_length,
        } = header;
        let mut sample = Sample {
            name: name.clone(),
            length,
            looping: SampleLoop::clamped(
                if loop_length > 2 { LoopMode::Forward } else { LoopMode::None },
                loop_start,
                loop_start.saturating_add(loop_length),
                length,
            ),
            ..Sample::default()
        };
        crate::formats::read_sample_data(&mut r, &mut builder, &mut sample)?;
        let sample_id = builder.add_sample(sample)?;
        let instrument = Instrument::single(
            name,
            SubInstrument {
                sample: Some(sample_id),
                volume,
                finetune,
                ..SubInstrument::default()
            },
        );
        builder.insert_instrument(
            index as u16,
            InstrumentDraft::banked(instrument),
            options.duplicate_policy_for(Format::Mod),
        )?;
    }

    Ok(builder)
}

struct SampleHeader {
    name: String,
    length: u32,
    finetune: i8,
    volume: u8,
    loop_start: u32,
    loop_length: u32,
}

fn read_sample_header(r: &mut ByteReader<'_>) -> Result<SampleHeader, FormatError> {
    let name = read_string(r.bytes(22)?);
    let length = u32::from(r.u16_be()?) * 2;
    // Signed nibble in 1/8 semitones, scaled to 1/128
    let finetune = ((r.u8()? & 0x0F) << 4) as i8;
    let volume = r.u8()?.min(64);
    let loop_start = u32::from(r.u16_be()?) * 2;
    let loop_length = u32::from(r.u16_be()?) * 2;
    Ok(SampleHeader {
        name,
        length,
        finetune,
        volume,
        loop_start,
        loop_length,
    })
}

/// Decode one 4-byte pattern cell
fn decode_cell(cell: &[u8]) -> (Event, Option<&'static str>) {
    let sample = (cell[0] & 0xF0) | (cell[2] >> 4);
    let period = (u16::from(cell[0] & 0x0F) << 8) | u16::from(cell[1]);
    let (effect, unsupported) = match effects::convert(cell[2] & 0x0F, cell[3]) {
        Ok(effect) => (effect, None),
        Err(feature) => (nether_tracker::Effect::None, Some(feature)),
    };
    let event = Event {
        note: period_to_note(period),
        instrument: (sample > 0).then(|| InstrumentId(u16::from(sample) - 1)),
        volume: None,
        effects: [effect, nether_tracker::Effect::None],
    };
    (event, unsupported)
}
