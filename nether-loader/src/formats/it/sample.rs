//! IT sample headers (IMPS) and sample data

use nether_tracker::{
    AutoVibrato, LoopMode, ModuleBuilder, Sample, SampleEncoding, SampleFormat, SampleId,
    SampleLoop, SamplePayload, SubInstrument, VibratoWaveform,
};

use crate::error::{FormatError, structure};
use crate::formats::{pan_from_64, read_sample_data};
use crate::reader::ByteReader;

const SAMPLE_MAGIC: &[u8; 4] = b"IMPS";

// Flg
const HAS_DATA: u8 = 0x01;
const SIXTEEN_BIT: u8 = 0x02;
const STEREO: u8 = 0x04;
const COMPRESSED: u8 = 0x08;
const LOOP: u8 = 0x10;
const SUSTAIN_LOOP: u8 = 0x20;
const PING_PONG: u8 = 0x40;
const SUSTAIN_PING_PONG: u8 = 0x80;

// Cvt
const CVT_SIGNED: u8 = 0x01;
const CVT_BIG_ENDIAN: u8 = 0x02;
const CVT_DELTA: u8 = 0x04;

const PAN_ENABLED: u8 = 0x80;

/// Per-sample settings that IT instruments inherit into their sub-instruments
#[derive(Debug, Clone)]
pub(super) struct SampleDefaults {
    pub(super) name: String,
    volume: u8,
    global_volume: u8,
    pan: Option<u8>,
    vibrato: AutoVibrato,
}

impl SampleDefaults {
    /// Sub-instrument playing sample `id` with this sample's defaults
    pub(super) fn sub(&self, id: SampleId) -> SubInstrument {
        SubInstrument {
            sample: Some(id),
            volume: self.volume,
            global_volume: self.global_volume,
            pan: self.pan,
            finetune: 0,
            relative_note: super::RELATIVE_NOTE,
            vibrato: self.vibrato,
        }
    }
}

/// Read the sample header at `offset` and the data it points to
///
/// An offset of zero is an empty bank slot.
pub(super) fn read_sample(
    data: &[u8],
    offset: u64,
    index: usize,
    builder: &mut ModuleBuilder,
) -> Result<(Sample, SampleDefaults), FormatError> {
    if offset == 0 {
        let defaults = SampleDefaults {
            name: String::new(),
            volume: 0,
            global_volume: 64,
            pan: None,
            vibrato: AutoVibrato::default(),
        };
        return Ok((Sample::default(), defaults));
    }

    let mut r = ByteReader::at(data, offset)?;
    if &r.tag()? != SAMPLE_MAGIC {
        return Err(structure(format!("sample {} lacks its IMPS header", index)));
    }

    // DOS filename (12 bytes) and reserved byte
    r.skip(13)?;
    let global_volume = r.u8()?.min(64);
    let flags = r.u8()?;
    let volume = r.u8()?.min(64);
    let name = r.string(26)?;
    let cvt = r.u8()?;
    let dfp = r.u8()?;
    let length = r.u32_le()?;
    let loop_start = r.u32_le()?;
    let loop_end = r.u32_le()?;
    let c5_speed = r.u32_le()?;
    let sustain_start = r.u32_le()?;
    let sustain_end = r.u32_le()?;
    let data_offset = u64::from(r.u32_le()?);

    // ViS, ViD, ViR, ViT
    let vibrato_speed = r.u8()?;
    let vibrato_depth = r.u8()?;
    let vibrato_rate = r.u8()?;
    let vibrato_type = r.u8()?;

    let defaults = SampleDefaults {
        name: name.clone(),
        volume,
        global_volume,
        pan: (dfp & PAN_ENABLED != 0).then(|| pan_from_64(dfp & 0x7F)),
        vibrato: AutoVibrato {
            waveform: VibratoWaveform::from_bits(vibrato_type),
            sweep: vibrato_rate,
            depth: vibrato_depth,
            rate: vibrato_speed,
        },
    };

    let length = if flags & HAS_DATA != 0 { length } else { 0 };
    let mode = |enabled: u8, ping_pong: u8| match (flags & enabled != 0, flags & ping_pong != 0) {
        (false, _) => LoopMode::None,
        (true, false) => LoopMode::Forward,
        (true, true) => LoopMode::PingPong,
    };
    let mut sample = Sample {
        name,
        length,
        looping: SampleLoop::clamped(mode(LOOP, PING_PONG), loop_start, loop_end, length),
        sustain: SampleLoop::clamped(
            mode(SUSTAIN_LOOP, SUSTAIN_PING_PONG),
            sustain_start,
            sustain_end,
            length,
        ),
        format: SampleFormat {
            bits: if flags & SIXTEEN_BIT != 0 { 16 } else { 8 },
            stereo: flags & STEREO != 0,
            encoding: if cvt & CVT_DELTA != 0 {
                SampleEncoding::DeltaPcm
            } else if cvt & CVT_SIGNED != 0 {
                SampleEncoding::SignedPcm
            } else {
                SampleEncoding::UnsignedPcm
            },
        },
        c_rate: if c5_speed == 0 { nether_tracker::DEFAULT_C_RATE } else { c5_speed },
        ..Sample::default()
    };
    if length == 0 {
        return Ok((sample, defaults));
    }
    if cvt & CVT_BIG_ENDIAN != 0 {
        builder.note_unsupported("big-endian samples", format!("sample {}", index));
    }

    let mut sr = ByteReader::at(data, data_offset.min(data.len() as u64))?;
    if flags & COMPRESSED != 0 {
        builder.note_unsupported("IT215 compressed samples", format!("sample {}", index));
        builder.check_sample_frames(u64::from(length))?;
        let channels = if sample.format.stereo { 2 } else { 1 };
        let raw = compressed_extent(&mut sr, length, sample.format.bits, channels);
        sample.format.encoding = SampleEncoding::It215;
        sample.payload = SamplePayload::new(raw.to_vec(), builder.ledger());
    } else {
        read_sample_data(&mut sr, builder, &mut sample)?;
    }
    Ok((sample, defaults))
}

/// Bytes spanned by IT 2.14/2.15 compressed data
///
/// The stream is a series of blocks, each a 16-bit byte count followed by
/// that many bytes and covering up to 0x8000 bytes of decoded output. Data
/// ending early yields what is there.
fn compressed_extent<'a>(r: &mut ByteReader<'a>, frames: u32, bits: u8, channels: u32) -> &'a [u8] {
    let block_frames: u32 = if bits == 16 { 0x4000 } else { 0x8000 };
    let blocks = frames.div_ceil(block_frames) * channels;
    let mut start = r.clone();
    let mut total = 0usize;
    for _ in 0..blocks {
        let Ok(len) = r.u16_le() else {
            break;
        };
        let body = r.bytes_lenient(len as usize);
        total += 2 + body.len();
    }
    start.bytes_lenient(total)
}
