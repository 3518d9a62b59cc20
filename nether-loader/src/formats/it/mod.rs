//! Impulse Tracker IT loader
//!
//! The header is followed by the order list and three tables of absolute
//! offsets (instruments, samples, patterns). Samples form a module-wide bank;
//! in instrument mode each instrument's keymap selects from that bank, in
//! sample mode the pattern instrument column addresses samples directly.

mod instrument;
mod pattern;
mod sample;

use nether_tracker::{
    DialectFlags, FormatId, FormatInfo, Instrument, InstrumentDraft, ModuleBuilder, Order,
    PatternId, PeriodMode, SampleId,
};

use crate::error::FormatError;
use crate::formats::pan_from_64;
use crate::reader::{ByteReader, read_string, slice_at};
use crate::{Format, LoadOptions};

const IT_MAGIC: &[u8; 4] = b"IMPM";
const CHANNEL_SLOTS: usize = 64;

/// IT note C-5 plays at the sample's C5 speed; the model's reference note is an octave lower
pub(crate) const RELATIVE_NOTE: i8 = -12;

// Header flags
const FLAG_STEREO: u16 = 0x01;
const FLAG_INSTRUMENTS: u16 = 0x04;
const FLAG_LINEAR_SLIDES: u16 = 0x08;
const FLAG_OLD_EFFECTS: u16 = 0x10;
const FLAG_LINK_G_MEMORY: u16 = 0x20;

// Special flags
const SPECIAL_MESSAGE: u16 = 0x01;
const SPECIAL_MIDI_CONFIG: u16 = 0x08;

const PAN_SURROUND: u8 = 100;
const PAN_DISABLED: u8 = 0x80;

pub(crate) fn probe(data: &[u8]) -> bool {
    slice_at(data, 0, 4) == Some(IT_MAGIC)
}

/// Writer name and dialect from the "created with" word
fn tracker_from_cwt(cwt: u16) -> (String, DialectFlags) {
    match cwt >> 12 {
        0 if cwt == 0x0888 => ("ModPlug Tracker".to_string(), DialectFlags::MODPLUG),
        0 => (
            format!("Impulse Tracker {}.{:02x}", (cwt >> 8) & 0x0F, cwt & 0xFF),
            DialectFlags::empty(),
        ),
        1 => ("Schism Tracker".to_string(), DialectFlags::empty()),
        5 => ("OpenMPT".to_string(), DialectFlags::MODPLUG),
        _ => ("unknown tracker".to_string(), DialectFlags::empty()),
    }
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<ModuleBuilder, FormatError> {
    if !probe(data) {
        return Err(FormatError::NotThisFormat);
    }

    let mut r = ByteReader::at(data, 4)?;

    // Song name (26 bytes) and pattern row highlight (2 bytes)
    let title = r.string(26)?;
    r.skip(2)?;

    let order_count = r.u16_le()? as usize;
    let instrument_count = r.u16_le()? as usize;
    let sample_count = r.u16_le()? as usize;
    let pattern_count = r.u16_le()? as usize;
    let cwt = r.u16_le()?;
    let cmwt = r.u16_le()?;
    let flags = r.u16_le()?;
    let special = r.u16_le()?;
    let global_volume = r.u8()?;
    let mix_volume = r.u8()?;
    let speed = r.u8()?;
    let tempo = r.u8()?;
    r.skip(2)?; // panning separation, pitch wheel depth
    let message_length = r.u16_le()? as usize;
    let message_offset = r.u32_le()? as usize;
    r.skip(4)?;
    let channel_pan = r.bytes(CHANNEL_SLOTS)?;
    let channel_volume = r.bytes(CHANNEL_SLOTS)?;

    let orders = r.bytes(order_count)?;
    let mut instrument_offsets = Vec::with_capacity(instrument_count);
    for _ in 0..instrument_count {
        instrument_offsets.push(u64::from(r.u32_le()?));
    }
    let mut sample_offsets = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        sample_offsets.push(u64::from(r.u32_le()?));
    }
    let mut pattern_offsets = Vec::with_capacity(pattern_count);
    for _ in 0..pattern_count {
        pattern_offsets.push(u64::from(r.u32_le()?));
    }

    // Patterns are decoded before the builder exists: the song's channel
    // count is the highest channel any pattern writes to
    let mut raw_patterns = Vec::with_capacity(pattern_count);
    for &offset in &pattern_offsets {
        raw_patterns.push(pattern::read_raw(data, offset)?);
    }
    let channels = raw_patterns
        .iter()
        .filter_map(|p| p.highest_channel())
        .max()
        .map_or(1, |max| usize::from(max) + 1);

    let (tracker, mut dialect) = tracker_from_cwt(cwt);
    if flags & FLAG_OLD_EFFECTS != 0 {
        dialect |= DialectFlags::OLD_EFFECTS;
    }
    if flags & FLAG_LINK_G_MEMORY != 0 {
        dialect |= DialectFlags::LINK_G_MEMORY;
    }
    let instrument_mode = flags & FLAG_INSTRUMENTS != 0;
    if !instrument_mode {
        dialect |= DialectFlags::SAMPLE_MODE;
    }
    let mut info = FormatInfo::new(FormatId::ImpulseTracker);
    info.tracker = tracker;
    info.dialect = dialect;
    let mut builder = options.builder(info, channels)?;
    builder.set_title(title);

    let stereo = flags & FLAG_STEREO != 0;
    let header = builder.header_mut();
    header.initial_speed = speed;
    header.initial_tempo = tempo;
    header.global_volume = global_volume.min(128);
    header.mix_volume = mix_volume.min(128);
    header.period_mode = if flags & FLAG_LINEAR_SLIDES != 0 {
        PeriodMode::Linear
    } else {
        PeriodMode::Amiga
    };
    let mut surround = false;
    for channel in 0..channels {
        let pan = channel_pan[channel];
        header.channel_pan[channel] = match pan & !PAN_DISABLED {
            _ if !stereo => 128,
            PAN_SURROUND => {
                surround = true;
                128
            }
            p => pan_from_64(p),
        };
        header.channel_volume[channel] = if pan & PAN_DISABLED != 0 {
            0
        } else {
            channel_volume[channel].min(64)
        };
    }
    if surround {
        builder.note_unsupported("surround panning", "channel settings");
    }
    if special & SPECIAL_MIDI_CONFIG != 0 {
        builder.note_unsupported("MIDI macros", "embedded MIDI configuration");
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

    if special & SPECIAL_MESSAGE != 0 && message_length > 0 {
        let end = message_offset.saturating_add(message_length).min(data.len());
        if let Some(bytes) = data.get(message_offset..end) {
            builder.set_message(read_string(bytes).replace('\r', "\n"));
        }
    }

    // Sample bank
    let mut defaults = Vec::with_capacity(sample_count);
    for (index, &offset) in sample_offsets.iter().enumerate() {
        let (sample, sample_defaults) = sample::read_sample(data, offset, index, &mut builder)?;
        builder.add_sample(sample)?;
        defaults.push(sample_defaults);
    }

    let policy = options.duplicate_policy_for(Format::It);
    if instrument_mode {
        for (index, &offset) in instrument_offsets.iter().enumerate() {
            let instrument = if offset == 0 {
                Instrument::default()
            } else {
                instrument::read_instrument(data, offset, cmwt, &defaults, &mut builder)?
            };
            builder.insert_instrument(index as u16, InstrumentDraft::banked(instrument), policy)?;
        }
    } else {
        for (index, sample_defaults) in defaults.iter().enumerate() {
            let instrument = Instrument::single(
                sample_defaults.name.clone(),
                sample_defaults.sub(SampleId(index as u16)),
            );
            builder.insert_instrument(index as u16, InstrumentDraft::banked(instrument), policy)?;
        }
    }

    for (index, raw) in raw_patterns.into_iter().enumerate() {
        let pattern = raw.into_pattern(&mut builder, index)?;
        builder.add_pattern(pattern)?;
    }

    Ok(builder)
}
