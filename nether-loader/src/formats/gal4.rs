//! Galaxy Music System 4.0 loader
//!
//! A RIFF container of form type `AMFF`. The `MAIN` chunk comes first and
//! carries the song header; `ORDR`, `PATT` and `INST` chunks follow in any
//! order. Patterns and instruments name their own slot numbers, so the same
//! slot can be declared twice; the duplicate policy decides what happens.
//! Each `INST` chunk ends with `SAMP` sub-chunks owned by that instrument.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use nether_tracker::{
    AutoVibrato, DuplicatePolicy, Effect, Envelope, EnvelopePoint, Event, FormatId, FormatInfo,
    Instrument, InstrumentDraft, InstrumentId, KeymapEntry, LoopMode, ModuleBuilder, NOTE_COUNT,
    Note, Order, Pattern, PatternId, PeriodMode, Sample, SampleEncoding, SampleFormat, SampleId,
    SampleLoop, SubInstrument, VibratoWaveform,
};

use crate::chunk::{Chunk, ChunkReader, LengthOrder};
use crate::error::{FormatError, structure};
use crate::formats::protracker::effects;
use crate::formats::{pan_from_64, read_sample_data};
use crate::reader::{ByteReader, slice_at};
use crate::{Format, LoadOptions};

const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const FORM_TYPE: &[u8; 4] = b"AMFF";
const MAIN: [u8; 4] = *b"MAIN";
const ORDR: [u8; 4] = *b"ORDR";
const PATT: [u8; 4] = *b"PATT";
const INST: [u8; 4] = *b"INST";
const SAMP: [u8; 4] = *b"SAMP";

const MAX_CHANNELS: u8 = 32;
const DEFAULT_ROWS: usize = 64;
const KEYMAP_LEN: usize = 108;
const ENVELOPE_POINTS: usize = 10;

const FLAG_AMIGA_PERIODS: u8 = 0x01;

// Pattern cell flags
const CELL_CHANNEL: u8 = 0x1F;
const CELL_VOLUME: u8 = 0x20;
const CELL_NOTE: u8 = 0x40;
const CELL_EFFECT: u8 = 0x80;

const NOTE_KEY_OFF: u8 = 128;
const EFFECT_SPEED: u8 = 0x14;

// Envelope flags, one nibble per envelope
const ENV_ON: u8 = 0x01;
const ENV_SUSTAIN: u8 = 0x02;
const ENV_LOOP: u8 = 0x04;

// Sample flags
const SAMPLE_16BIT: u8 = 0x04;
const SAMPLE_LOOP: u8 = 0x08;
const SAMPLE_PING_PONG: u8 = 0x10;

pub(crate) fn probe(data: &[u8]) -> bool {
    slice_at(data, 0, 4) == Some(RIFF_MAGIC)
        && slice_at(data, 8, 4) == Some(FORM_TYPE)
        && slice_at(data, 12, 4) == Some(&MAIN)
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    if !probe(data) {
        return Err(FormatError::NotThisFormat);
    }

    let mut chunks = ChunkReader::new(ByteReader::at(data, 12)?, LengthOrder::Little);
    let main = chunks
        .next_chunk()?
        .ok_or_else(|| structure("missing MAIN chunk"))?;
    let mut builder = read_main(&main, options)?;

    let policy = options.duplicate_policy_for(Format::Gal4);
    let mut patterns: HashMap<u8, Pattern> = HashMap::new();
    for chunk in chunks {
        let chunk = chunk?;
        match chunk.tag {
            ORDR => read_orders(&chunk, &mut builder)?,
            PATT => {
                let (slot, pattern) = read_pattern(&chunk, &mut builder)?;
                match (patterns.entry(slot), policy) {
                    (Entry::Vacant(entry), _) => {
                        entry.insert(pattern);
                    }
                    (Entry::Occupied(_), DuplicatePolicy::Reject) => {
                        return Err(structure(format!("pattern {} declared twice", slot)));
                    }
                    (Entry::Occupied(_), DuplicatePolicy::FirstWins) => {
                        tracing::debug!("Discarding duplicate declaration of pattern {}", slot);
                    }
                    (Entry::Occupied(mut entry), DuplicatePolicy::LastWins) => {
                        tracing::debug!("Replacing earlier declaration of pattern {}", slot);
                        entry.insert(pattern);
                    }
                }
            }
            INST => {
                let (slot, draft) = read_instrument(&chunk, &mut builder)?;
                builder.insert_instrument(u16::from(slot), draft, policy)?;
            }
            MAIN => return Err(structure("second MAIN chunk")),
            _ => tracing::debug!("Skipping Galaxy chunk '{}'", chunk.tag_str()),
        }
    }

    // Pattern slots are sparse; gaps become empty patterns
    let count = patterns.keys().max().map_or(0, |&max| usize::from(max) + 1);
    for slot in 0..count {
        let pattern = match patterns.remove(&(slot as u8)) {
            Some(pattern) => pattern,
            None => builder.new_pattern(DEFAULT_ROWS, builder.channels())?,
        };
        builder.add_pattern(pattern)?;
    }

    Ok(builder)
}

fn read_main(chunk: &Chunk<'_>, options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    let mut r = chunk.reader();
    let title = r.string(64)?;
    let flags = r.u8()?;
    let channels = r.u8()?;
    let speed = r.u8()?;
    let tempo = r.u8()?;
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(structure(format!("{} channels declared", channels)));
    }

    let mut builder = options.builder(FormatInfo::new(FormatId::Galaxy4), usize::from(channels))?;
    builder.set_title(title);
    let header = builder.header_mut();
    if speed > 0 {
        header.initial_speed = speed;
    }
    if tempo >= 32 {
        header.initial_tempo = tempo;
    }
    header.period_mode = if flags & FLAG_AMIGA_PERIODS != 0 {
        PeriodMode::Amiga
    } else {
        PeriodMode::Linear
    };
    Ok(builder)
}

fn read_orders(chunk: &Chunk<'_>, builder: &mut ModuleBuilder) -> Result<(), FormatError> {
    let mut r = chunk.reader();
    let count = usize::from(r.u8()?) + 1;
    let orders = r
        .bytes(count)?
        .iter()
        .map(|&p| Order::Pattern(PatternId(u16::from(p))))
        .collect();
    builder.set_orders(orders)?;
    Ok(())
}

/// Decode one `PATT` chunk into its slot number and pattern
///
/// Cells for channels beyond the song's channel count are read and dropped.
fn read_pattern(
    chunk: &Chunk<'_>,
    builder: &mut ModuleBuilder,
) -> Result<(u8, Pattern), FormatError> {
    let mut r = chunk.reader();
    let slot = r.u8()?;
    let length = r.u32_le()? as usize;
    let rows = usize::from(r.u8()?) + 1;
    let mut cells = r.sub(length.min(r.remaining()))?;

    let channels = builder.channels();
    let mut pattern = builder.new_pattern(rows, channels)?;
    let mut row = 0u16;
    while usize::from(row) < rows && cells.remaining() > 0 {
        let flag = cells.u8()?;
        if flag == 0 {
            row += 1;
            continue;
        }
        let channel = flag & CELL_CHANNEL;
        let mut event = Event::EMPTY;

        if flag & CELL_EFFECT != 0 {
            let param = cells.u8()?;
            let command = cells.u8()?;
            event.effects[0] = match command {
                EFFECT_SPEED => Effect::SetSpeed(param),
                0x00..=0x0F => match effects::convert(command, param) {
                    Ok(effect) => effect,
                    Err(feature) => {
                        builder.note_unsupported(feature, format!("pattern {} row {}", slot, row));
                        Effect::None
                    }
                },
                _ => {
                    builder.note_unsupported(
                        "unknown effects",
                        format!("pattern {} row {}: {:02x}{:02x}", slot, row, command, param),
                    );
                    Effect::None
                }
            };
        }
        if flag & CELL_NOTE != 0 {
            let instrument = cells.u8()?;
            let note = cells.u8()?;
            event.instrument = instrument.checked_sub(1).map(|i| InstrumentId(u16::from(i)));
            event.note = match note {
                0 => Note::None,
                NOTE_KEY_OFF => Note::Off,
                n => Note::on(n - 1),
            };
        }
        if flag & CELL_VOLUME != 0 {
            event.volume = Some((cells.u8()? / 2).min(64));
        }

        if channel < channels {
            pattern.set(row, channel, event)?;
        }
    }
    Ok((slot, pattern))
}

/// Decode one `INST` chunk and its samples
fn read_instrument(
    chunk: &Chunk<'_>,
    builder: &mut ModuleBuilder,
) -> Result<(u8, InstrumentDraft), FormatError> {
    let mut r = chunk.reader();
    r.skip(5)?;
    let slot = r.u8()?;
    let name = r.string(28)?;
    let sample_count = usize::from(r.u8()?);
    let keymap = r.bytes(KEYMAP_LEN)?;
    r.skip(11)?;

    let vibrato_waveform = r.u8()?;
    let vibrato_sweep = r.u8()?;
    r.skip(2)?;
    let vibrato_depth = r.u8()?;
    let vibrato_rate = r.u16_le()? / 16;
    r.skip(1)?;
    let vibrato = AutoVibrato {
        waveform: VibratoWaveform::from_bits(vibrato_waveform),
        sweep: vibrato_sweep,
        depth: vibrato_depth,
        rate: vibrato_rate.min(u16::from(u8::MAX)) as u8,
    };

    let flags = r.u8()?;
    let counts = r.u8()?;
    let sustain = r.u8()?;
    let loop_start = r.u8()?;
    let loop_end = r.u8()?;
    let volume_points = read_points(&mut r, usize::from(counts & 0x0F) + 1, 0)?;
    let pan_points = read_points(&mut r, usize::from(counts >> 4) + 1, 32)?;
    let fadeout = r.u8()?;
    r.skip(1)?;

    let low = |byte: u8| byte & 0x0F;
    let high = |byte: u8| byte >> 4;
    let volume_envelope = build_envelope(
        volume_points,
        low(flags),
        low(sustain),
        (low(loop_start), low(loop_end)),
    );
    let pan_envelope = build_envelope(
        pan_points,
        high(flags),
        high(sustain),
        (high(loop_start), high(loop_end)),
    );

    let mut samples = Vec::with_capacity(sample_count);
    let mut subinstruments = Vec::with_capacity(sample_count);
    let mut records = ChunkReader::new(r, LengthOrder::Little);
    for index in 0..sample_count {
        let record = records
            .next_chunk()?
            .ok_or_else(|| structure(format!("instrument {} lacks sample {}", slot, index)))?;
        if record.tag != SAMP {
            return Err(structure(format!(
                "instrument {} has '{}' where a sample was expected",
                slot,
                record.tag_str()
            )));
        }
        let (sample, mut sub) = read_sample(&record, builder)?;
        sub.sample = Some(SampleId(index as u16));
        sub.vibrato = vibrato;
        samples.push(sample);
        subinstruments.push(sub);
    }

    let mut map = vec![KeymapEntry::UNMAPPED; NOTE_COUNT];
    for (note, entry) in map.iter_mut().enumerate() {
        let sub = keymap[note.min(KEYMAP_LEN - 1)];
        if usize::from(sub) < sample_count {
            *entry = KeymapEntry {
                sub: Some(sub),
                note: note as u8,
            };
        }
    }

    let instrument = Instrument {
        name,
        fadeout: u32::from(fadeout) << 8,
        volume_envelope: Some(volume_envelope),
        pan_envelope: Some(pan_envelope),
        keymap: map,
        subinstruments,
        ..Instrument::default()
    };
    Ok((slot, InstrumentDraft::owned(instrument, samples)))
}

/// Ten 3-byte (tick, value) nodes, of which the first `count` are used
fn read_points(
    r: &mut ByteReader<'_>,
    count: usize,
    centre: i16,
) -> Result<Vec<EnvelopePoint>, FormatError> {
    let mut points = Vec::with_capacity(count.min(ENVELOPE_POINTS));
    for node in 0..ENVELOPE_POINTS {
        let tick = r.u16_le()? / 16;
        let value = i16::from(r.u8()?.min(64)) - centre;
        if node < count {
            points.push(EnvelopePoint {
                tick,
                value: value as i8,
            });
        }
    }
    Ok(points)
}

fn build_envelope(
    points: Vec<EnvelopePoint>,
    flags: u8,
    sustain: u8,
    loop_range: (u8, u8),
) -> Envelope {
    Envelope::sanitized(
        points,
        (flags & ENV_LOOP != 0).then_some(loop_range),
        (flags & ENV_SUSTAIN != 0).then_some((sustain, sustain)),
        flags & ENV_ON != 0,
    )
}

fn read_sample(
    record: &Chunk<'_>,
    builder: &mut ModuleBuilder,
) -> Result<(Sample, SubInstrument), FormatError> {
    let mut r = record.reader();
    let name = r.string(28)?;
    let pan = r.u8()?;
    let volume = r.u8()?.min(64);
    let flags = r.u8()?;
    r.skip(1)?;
    let length = r.u32_le()?;
    let loop_start = r.u32_le()?;
    let loop_end = r.u32_le()?;
    let c_rate = r.u32_le()?;
    r.skip(8)?;

    let sixteen_bit = flags & SAMPLE_16BIT != 0;
    let frame_bytes = if sixteen_bit { 2 } else { 1 };
    let length = length / frame_bytes;
    let loop_mode = match (flags & SAMPLE_LOOP != 0, flags & SAMPLE_PING_PONG != 0) {
        (false, _) => LoopMode::None,
        (true, false) => LoopMode::Forward,
        (true, true) => LoopMode::PingPong,
    };
    let mut sample = Sample {
        name,
        length,
        looping: SampleLoop::clamped(
            loop_mode,
            loop_start / frame_bytes,
            loop_end / frame_bytes,
            length,
        ),
        format: SampleFormat {
            bits: if sixteen_bit { 16 } else { 8 },
            stereo: false,
            encoding: SampleEncoding::SignedPcm,
        },
        c_rate: if c_rate == 0 { nether_tracker::DEFAULT_C_RATE } else { c_rate },
        ..Sample::default()
    };
    read_sample_data(&mut r, builder, &mut sample)?;

    let sub = SubInstrument {
        volume,
        pan: Some(pan_from_64(pan)),
        ..SubInstrument::default()
    };
    Ok((sample, sub))
}
