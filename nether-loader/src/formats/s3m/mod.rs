//! Scream Tracker 3 loader
//!
//! The header is followed by the order list and two tables of paragraph
//! pointers (offset / 16), one for instruments and one for patterns. Patterns
//! are packed per row with a channel/mask byte in front of every cell.

pub(crate) mod effects;

use nether_tracker::{
    DialectFlags, Effect, Event, FormatId, FormatInfo, Instrument, InstrumentDraft, InstrumentId,
    LoopMode, ModuleBuilder, Note, Order, PatternId, Sample, SampleEncoding, SampleFormat,
    SampleLoop, SubInstrument,
};

use crate::error::FormatError;
use crate::reader::{ByteReader, read_string, slice_at};
use crate::{Format, LoadOptions};

use effects::Flavor;

const MAGIC: &[u8; 4] = b"SCRM";
const MAGIC_OFFSET: usize = 0x2C;
const FILE_TYPE: u8 = 16;
const ROWS: usize = 64;
const CHANNEL_SLOTS: usize = 32;

const FLAG_AMIGA_LIMITS: u16 = 0x10;
const FLAG_FAST_SLIDES: u16 = 0x40;
const DEFAULT_PAN_MARKER: u8 = 0xFC;

const SAMPLE_LOOP: u8 = 0x01;
const SAMPLE_STEREO: u8 = 0x02;
const SAMPLE_16BIT: u8 = 0x04;

pub(crate) fn probe(data: &[u8]) -> bool {
    slice_at(data, MAGIC_OFFSET, 4) == Some(MAGIC) && data.get(0x1D) == Some(&FILE_TYPE)
}

/// Writer name and dialect from the "created with" word
fn tracker_from_cwt(cwt: u16) -> (String, DialectFlags) {
    let version = cwt & 0x0FFF;
    match cwt >> 12 {
        1 => (
            format!("Scream Tracker {}.{:02x}", version >> 8, version & 0xFF),
            DialectFlags::empty(),
        ),
        2 => ("Imago Orpheus".to_string(), DialectFlags::empty()),
        3 => ("Impulse Tracker".to_string(), DialectFlags::empty()),
        4 => ("Schism Tracker".to_string(), DialectFlags::empty()),
        5 => ("OpenMPT".to_string(), DialectFlags::MODPLUG),
        _ => ("unknown tracker".to_string(), DialectFlags::empty()),
    }
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    if !probe(data) {
        return Err(FormatError::NotThisFormat);
    }

    let mut r = ByteReader::new(data);
    let title = r.string(28)?;
    r.skip(4)?; // 0x1A, type, reserved
    let order_count = r.u16_le()? as usize;
    let instrument_count = r.u16_le()? as usize;
    let pattern_count = r.u16_le()? as usize;
    let flags = r.u16_le()?;
    let cwt = r.u16_le()?;
    let sample_format = r.u16_le()?;
    r.skip(4)?; // SCRM
    let global_volume = r.u8()?;
    let speed = r.u8()?;
    let tempo = r.u8()?;
    let master_volume = r.u8()?;
    r.skip(1)?; // ultraclick
    let default_pan = r.u8()?;
    r.skip(10)?;
    let settings = r.bytes(CHANNEL_SLOTS)?;

    // Song channels run up to the last enabled PCM channel
    let channels = settings
        .iter()
        .rposition(|&s| s < 16)
        .map_or(0, |last| last + 1);
    if channels == 0 {
        return Err(crate::error::structure("no enabled PCM channels"));
    }

    let (tracker, mut dialect) = tracker_from_cwt(cwt);
    if flags & FLAG_FAST_SLIDES != 0 || cwt == 0x1300 {
        dialect |= DialectFlags::FAST_VOLUME_SLIDES;
    }
    if flags & FLAG_AMIGA_LIMITS != 0 {
        dialect |= DialectFlags::AMIGA_LIMITS;
    }
    let mut info = FormatInfo::new(FormatId::ScreamTracker3);
    info.tracker = tracker;
    info.dialect = dialect;
    let mut builder = options.builder(info, channels)?;
    builder.set_title(title);

    let orders = r.bytes(order_count)?;
    let mut instrument_pointers = Vec::with_capacity(instrument_count);
    for _ in 0..instrument_count {
        instrument_pointers.push(u64::from(r.u16_le()?) * 16);
    }
    let mut pattern_pointers = Vec::with_capacity(pattern_count);
    for _ in 0..pattern_count {
        pattern_pointers.push(u64::from(r.u16_le()?) * 16);
    }
    let pans = if default_pan == DEFAULT_PAN_MARKER {
        Some(r.bytes(CHANNEL_SLOTS)?)
    } else {
        None
    };

    let stereo = master_volume & 0x80 != 0;
    let header = builder.header_mut();
    header.initial_speed = if speed == 0 || speed == 255 { 6 } else { speed };
    header.initial_tempo = if tempo < 33 { 125 } else { tempo };
    header.global_volume = global_volume.min(64) * 2;
    header.mix_volume = master_volume & 0x7F;
    for channel in 0..channels {
        let setting = settings[channel];
        header.channel_pan[channel] = match pans.map(|p| p[channel]) {
            Some(pan) if pan & 0x20 != 0 => (pan & 0x0F) * 17,
            _ if !stereo => 128,
            _ if setting & 0x7F < 8 => 0x3 * 17,
            _ => 0xC * 17,
        };
        if setting >= 16 {
            header.channel_volume[channel] = 0;
        }
    }
    if settings[..channels].iter().any(|&s| (16..=29).contains(&(s & 0x7F))) {
        builder.note_unsupported("AdLib channels", "channel settings");
    }

    builder.set_orders(
        orders
            .iter()
            .map(|&o| match o {
                255 => Order::End,
                254 => Order::Skip,
                p => Order::Pattern(PatternId(u16::from(p))),
            })
            .collect(),
    )?;

    let unsigned = sample_format != 1;
    for (index, &pointer) in instrument_pointers.iter().enumerate() {
        let draft = read_instrument(data, pointer, unsigned, &mut builder)?;
        builder.insert_instrument(index as u16, draft, options.duplicate_policy_for(Format::S3m))?;
    }

    for (index, &pointer) in pattern_pointers.iter().enumerate() {
        let mut pattern = builder.new_pattern(ROWS, channels as u8)?;
        if pointer != 0 {
            let mut r = ByteReader::at(data, pointer)?;
            r.skip(2)?; // packed length, unreliable in the wild
            read_pattern(&mut r, &mut pattern, &mut builder, index)?;
        }
        builder.add_pattern(pattern)?;
    }

    Ok(builder)
}

/// Read one instrument record and its sample data
fn read_instrument(
    data: &[u8],
    pointer: u64,
    unsigned: bool,
    builder: &mut ModuleBuilder,
) -> Result<InstrumentDraft, FormatError> {
    let mut r = ByteReader::at(data, pointer)?;
    let kind = r.u8()?;
    r.skip(12)?; // DOS filename
    let seg = r.bytes(3)?;
    let length = r.u32_le()?;
    let loop_start = r.u32_le()?;
    let loop_end = r.u32_le()?;
    let volume = r.u8()?.min(64);
    r.skip(1)?;
    let pack = r.u8()?;
    let flags = r.u8()?;
    let c2spd = r.u32_le()? & 0xFFFF;
    r.skip(12)?;
    let name = read_string(r.bytes(28)?);

    match kind {
        0 => return Ok(InstrumentDraft::banked(Instrument { name, ..Instrument::default() })),
        1 => {}
        _ => {
            builder.note_unsupported("AdLib instruments", format!("instrument '{}'", name));
            return Ok(InstrumentDraft::banked(Instrument { name, ..Instrument::default() }));
        }
    }

    let mut sample = Sample {
        name: name.clone(),
        length,
        looping: SampleLoop::clamped(
            if flags & SAMPLE_LOOP != 0 { LoopMode::Forward } else { LoopMode::None },
            loop_start,
            loop_end,
            length,
        ),
        format: SampleFormat {
            bits: if flags & SAMPLE_16BIT != 0 { 16 } else { 8 },
            stereo: false,
            encoding: if unsigned { SampleEncoding::UnsignedPcm } else { SampleEncoding::SignedPcm },
        },
        c_rate: if c2spd == 0 { nether_tracker::DEFAULT_C_RATE } else { c2spd },
        ..Sample::default()
    };
    if flags & SAMPLE_STEREO != 0 {
        // Right channel block follows the left one and is not read
        builder.note_unsupported("stereo samples", format!("sample '{}'", name));
    }

    if pack != 0 {
        builder.note_unsupported("packed samples", format!("sample '{}'", name));
        sample.length = 0;
        sample.looping = SampleLoop::NONE;
    } else {
        let offset = ((u64::from(seg[0]) << 16) | u64::from(seg[1]) | (u64::from(seg[2]) << 8)) * 16;
        let mut sr = ByteReader::at(data, offset.min(data.len() as u64))?;
        crate::formats::read_sample_data(&mut sr, builder, &mut sample)?;
    }

    let sample_id = builder.add_sample(sample)?;
    Ok(InstrumentDraft::banked(Instrument::single(
        name,
        SubInstrument {
            sample: Some(sample_id),
            volume,
            ..SubInstrument::default()
        },
    )))
}

fn read_pattern(
    r: &mut ByteReader<'_>,
    pattern: &mut nether_tracker::Pattern,
    builder: &mut ModuleBuilder,
    index: usize,
) -> Result<(), FormatError> {
    let channels = pattern.channels();
    for row in 0..ROWS as u16 {
        loop {
            let what = r.u8()?;
            if what == 0 {
                break;
            }
            let channel = what & 0x1F;
            let mut event = Event::EMPTY;
            if what & 0x20 != 0 {
                event.note = decode_note(r.u8()?);
                let instrument = r.u8()?;
                event.instrument = (instrument > 0).then(|| InstrumentId(u16::from(instrument) - 1));
            }
            if what & 0x40 != 0 {
                event.volume = Some(r.u8()?.min(64));
            }
            if what & 0x80 != 0 {
                let command = r.u8()?;
                let param = r.u8()?;
                event.effects[0] = match effects::convert(command, param, Flavor::S3m) {
                    Ok(effect) => effect,
                    Err(feature) => {
                        builder.note_unsupported(feature, format!("pattern {} row {}", index, row));
                        Effect::None
                    }
                };
            }
            if channel < channels {
                pattern.set(row, channel, event)?;
            }
        }
    }
    Ok(())
}

/// Octave in the high nibble, semitone in the low nibble
fn decode_note(byte: u8) -> Note {
    match byte {
        255 => Note::None,
        254 => Note::Cut,
        _ if byte & 0x0F > 11 => Note::None,
        _ => Note::on((byte >> 4) * 12 + (byte & 0x0F)),
    }
}

#[cfg(test)]
mod tests;
