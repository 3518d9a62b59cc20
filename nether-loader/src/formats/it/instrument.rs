//! IT instrument headers (IMPI)
//!
//! Files compatible with IT 2.00 and later use the current layout with three
//! envelopes; older files carry a single volume envelope and a simpler
//! duplicate note check.

use hashbrown::HashMap;

use nether_tracker::{
    DuplicateCheckAction, DuplicateCheckType, Envelope, EnvelopePoint, Instrument, KeymapEntry,
    MAX_NOTE, ModuleBuilder, NOTE_COUNT, NewNoteAction, SampleId, SubInstrument,
};

use super::sample::SampleDefaults;
use crate::error::{FormatError, structure};
use crate::formats::pan_from_64;
use crate::reader::ByteReader;

const INSTRUMENT_MAGIC: &[u8; 4] = b"IMPI";
const ENVELOPE_NODES: usize = 25;

// Envelope flags
const ENV_ON: u8 = 0x01;
const ENV_LOOP: u8 = 0x02;
const ENV_SUSTAIN: u8 = 0x04;
const ENV_CARRY: u8 = 0x08;
const ENV_FILTER: u8 = 0x80;

const PAN_DISABLED: u8 = 0x80;
const FILTER_ENABLED: u8 = 0x80;

/// Which envelope is being read, for value ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeKind {
    Volume,
    Pan,
    Pitch,
}

pub(super) fn read_instrument(
    data: &[u8],
    offset: u64,
    cmwt: u16,
    samples: &[SampleDefaults],
    builder: &mut ModuleBuilder,
) -> Result<Instrument, FormatError> {
    let mut r = ByteReader::at(data, offset)?;
    if &r.tag()? != INSTRUMENT_MAGIC {
        return Err(structure(format!(
            "instrument at offset {} lacks its IMPI header",
            offset
        )));
    }
    // DOS filename (12 bytes) and reserved byte
    r.skip(13)?;
    if cmwt < 0x0200 {
        read_old_layout(&mut r, samples)
    } else {
        read_current_layout(&mut r, samples, builder)
    }
}

fn read_current_layout(
    r: &mut ByteReader<'_>,
    samples: &[SampleDefaults],
    builder: &mut ModuleBuilder,
) -> Result<Instrument, FormatError> {
    let nna = NewNoteAction::from_raw(r.u8()?);
    let dct = DuplicateCheckType::from_raw(r.u8()?);
    let dca = DuplicateCheckAction::from_raw(r.u8()?);
    let fadeout = r.u16_le()?;
    let pitch_pan_separation = r.i8()?;
    r.skip(1)?; // pitch-pan centre
    let global_volume = r.u8()?.min(128);
    let dfp = r.u8()?;
    let random_volume = r.u8()?;
    let random_pan = r.u8()?;
    r.skip(4)?; // tracker version, sample count
    let name = r.string(26)?;
    let cutoff = r.u8()?;
    let resonance = r.u8()?;
    r.skip(4)?; // MIDI channel, program, bank
    let keymap = r.bytes(NOTE_COUNT * 2)?;

    let volume_envelope = read_envelope(r, EnvelopeKind::Volume)?;
    let pan_envelope = read_envelope(r, EnvelopeKind::Pan)?;
    let (pitch_envelope, filter) = match read_envelope(r, EnvelopeKind::Pitch)? {
        (envelope, true) => (Envelope { enabled: false, ..envelope }, true),
        (envelope, false) => (envelope, false),
    };

    let detail = || format!("instrument '{}'", name);
    if random_volume != 0 || random_pan != 0 {
        builder.note_unsupported("random volume/pan variation", detail());
    }
    if pitch_pan_separation != 0 {
        builder.note_unsupported("pitch-pan separation", detail());
    }
    if filter || cutoff & FILTER_ENABLED != 0 || resonance & FILTER_ENABLED != 0 {
        builder.note_unsupported("resonant filters", detail());
    }

    let (keymap, subinstruments) = build_keymap(keymap, samples);
    Ok(Instrument {
        name,
        global_volume,
        // Fade counter of 1024 in IT, 65536 in the model
        fadeout: u32::from(fadeout) * 64,
        default_pan: (dfp & PAN_DISABLED == 0).then(|| pan_from_64(dfp)),
        volume_envelope: Some(volume_envelope.0),
        pan_envelope: Some(pan_envelope.0),
        pitch_envelope: Some(pitch_envelope),
        nna,
        dct,
        dca,
        keymap,
        subinstruments,
    })
}

fn read_old_layout(
    r: &mut ByteReader<'_>,
    samples: &[SampleDefaults],
) -> Result<Instrument, FormatError> {
    let flags = r.u8()?;
    let loop_range = (r.u8()?, r.u8()?);
    let sustain_range = (r.u8()?, r.u8()?);
    r.skip(2)?;
    let fadeout = r.u16_le()?;
    let nna = NewNoteAction::from_raw(r.u8()?);
    let duplicate_check = r.u8()?;
    r.skip(4)?; // tracker version, sample count, reserved
    let name = r.string(26)?;
    r.skip(6)?;
    let keymap = r.bytes(NOTE_COUNT * 2)?;
    r.skip(200)?; // precomputed volume curve

    let mut points = Vec::with_capacity(ENVELOPE_NODES);
    for _ in 0..ENVELOPE_NODES {
        let tick = r.u8()?;
        let value = r.u8()?;
        if tick == 0xFF {
            break;
        }
        points.push(EnvelopePoint {
            tick: u16::from(tick),
            value: value.min(64) as i8,
        });
    }
    let volume_envelope = Envelope::sanitized(
        points,
        (flags & ENV_LOOP != 0).then_some(loop_range),
        (flags & ENV_SUSTAIN != 0).then_some(sustain_range),
        flags & ENV_ON != 0,
    );

    let (keymap, subinstruments) = build_keymap(keymap, samples);
    Ok(Instrument {
        name,
        // Fade counter of 512 in old IT files
        fadeout: u32::from(fadeout) * 128,
        volume_envelope: Some(volume_envelope),
        nna,
        dct: if duplicate_check != 0 {
            DuplicateCheckType::Note
        } else {
            DuplicateCheckType::Off
        },
        dca: DuplicateCheckAction::Cut,
        keymap,
        subinstruments,
        ..Instrument::default()
    })
}

/// Read one 82-byte envelope; the flag is set when a pitch envelope drives the filter
fn read_envelope(
    r: &mut ByteReader<'_>,
    kind: EnvelopeKind,
) -> Result<(Envelope, bool), FormatError> {
    let flags = r.u8()?;
    let count = r.u8()? as usize;
    let loop_range = (r.u8()?, r.u8()?);
    let sustain_range = (r.u8()?, r.u8()?);

    let mut points = Vec::with_capacity(count.min(ENVELOPE_NODES));
    for node in 0..ENVELOPE_NODES {
        let raw = r.i8()?;
        let tick = r.u16_le()?;
        if node < count {
            let value = match kind {
                EnvelopeKind::Volume => raw.clamp(0, 64),
                EnvelopeKind::Pan | EnvelopeKind::Pitch => raw.clamp(-32, 32),
            };
            points.push(EnvelopePoint { tick, value });
        }
    }
    r.skip(1)?;

    let mut envelope = Envelope::sanitized(
        points,
        (flags & ENV_LOOP != 0).then_some(loop_range),
        (flags & ENV_SUSTAIN != 0).then_some(sustain_range),
        flags & ENV_ON != 0,
    );
    envelope.carry = flags & ENV_CARRY != 0;
    let filter = kind == EnvelopeKind::Pitch && flags & ENV_FILTER != 0 && envelope.enabled;
    Ok((envelope, filter))
}

/// Turn the 120 (note, sample) pairs into a keymap over sub-instruments
///
/// Each distinct sample gets one sub-instrument carrying that sample's
/// defaults, in order of first use.
fn build_keymap(
    pairs: &[u8],
    samples: &[SampleDefaults],
) -> (Vec<KeymapEntry>, Vec<SubInstrument>) {
    let mut subs: Vec<SubInstrument> = Vec::new();
    let mut by_sample: HashMap<u8, u8> = HashMap::new();
    let mut keymap = vec![KeymapEntry::UNMAPPED; NOTE_COUNT];

    for (entry, pair) in keymap.iter_mut().zip(pairs.chunks_exact(2)) {
        let (note, sample) = (pair[0], pair[1]);
        if sample == 0 || note > MAX_NOTE {
            continue;
        }
        let sub = *by_sample.entry(sample).or_insert_with(|| {
            let id = SampleId(u16::from(sample) - 1);
            subs.push(match samples.get(id.index()) {
                Some(defaults) => defaults.sub(id),
                None => SubInstrument {
                    sample: Some(id),
                    relative_note: super::RELATIVE_NOTE,
                    ..SubInstrument::default()
                },
            });
            (subs.len() - 1) as u8
        });
        *entry = KeymapEntry {
            sub: Some(sub),
            note,
        };
    }
    (keymap, subs)
}
