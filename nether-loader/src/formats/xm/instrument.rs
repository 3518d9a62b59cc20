//! XM instrument and sample headers

use nether_tracker::{
    AutoVibrato, Envelope, EnvelopePoint, Instrument, InstrumentDraft, KeymapEntry, LoopMode,
    ModuleBuilder, Sample, SampleEncoding, SampleFormat, SampleId, SampleLoop,
    SubInstrument, VibratoWaveform,
};

use crate::error::FormatError;
use crate::formats::read_sample_data;
use crate::reader::ByteReader;

const KEYMAP_LEN: usize = 96;
const ENVELOPE_POINTS: usize = 12;
const SAMPLE_HEADER_LEN: u32 = 40;

const SAMPLE_16BIT: u8 = 0x10;
const RESERVED_ADPCM: u8 = 0xAD;

/// An instrument whose sample data has not been read yet
pub(super) struct PendingInstrument {
    instrument: Instrument,
    headers: Vec<SampleHeader>,
}

struct SampleHeader {
    name: String,
    length_bytes: u32,
    loop_start_bytes: u32,
    loop_length_bytes: u32,
    loop_mode: LoopMode,
    sixteen_bit: bool,
    adpcm: bool,
}

/// Read an instrument header and its sample headers
pub(super) fn read_header(
    r: &mut ByteReader<'_>,
    builder: &mut ModuleBuilder,
) -> Result<PendingInstrument, FormatError> {
    // Header size includes the size field itself
    let header_start = r.position() as u64;
    let header_size = r.u32_le()?;
    let header_end = header_start + u64::from(header_size);

    let name = r.string(22)?;
    let mut instrument = Instrument {
        name,
        ..Instrument::default()
    };

    if header_size < 29 {
        r.seek(header_end)?;
        return Ok(PendingInstrument {
            instrument,
            headers: Vec::new(),
        });
    }

    // Instrument type (1 byte), always 0
    r.skip(1)?;
    let sample_count = r.u16_le()? as usize;
    if sample_count == 0 {
        r.seek(header_end)?;
        return Ok(PendingInstrument {
            instrument,
            headers: Vec::new(),
        });
    }

    let sample_header_size = r.u32_le()?;
    let keymap = r.bytes(KEYMAP_LEN)?;
    let volume_points = read_points(r, 0)?;
    let pan_points = read_points(r, 32)?;

    let volume_count = r.u8()? as usize;
    let pan_count = r.u8()? as usize;
    let volume_sustain = r.u8()?;
    let volume_loop = (r.u8()?, r.u8()?);
    let pan_sustain = r.u8()?;
    let pan_loop = (r.u8()?, r.u8()?);
    let volume_type = r.u8()?;
    let pan_type = r.u8()?;

    let vibrato = AutoVibrato {
        waveform: match r.u8()? {
            1 => VibratoWaveform::Square,
            2 | 3 => VibratoWaveform::RampDown,
            _ => VibratoWaveform::Sine,
        },
        sweep: r.u8()?,
        depth: r.u8()?,
        rate: r.u8()?,
    };
    // FT2 fades from 32768; the model counter runs from 65536
    instrument.fadeout = u32::from(r.u16_le()?) * 2;
    r.seek(header_end)?;

    instrument.volume_envelope = Some(build_envelope(
        volume_points,
        volume_count,
        volume_type,
        volume_sustain,
        volume_loop,
    ));
    instrument.pan_envelope = Some(build_envelope(
        pan_points,
        pan_count,
        pan_type,
        pan_sustain,
        pan_loop,
    ));

    // Notes above B-7 reuse the last keymap entry
    for (note, entry) in instrument.keymap.iter_mut().enumerate() {
        let sub = keymap[note.min(KEYMAP_LEN - 1)];
        *entry = KeymapEntry {
            sub: Some(sub),
            note: note as u8,
        };
    }

    let mut headers = Vec::with_capacity(sample_count);
    for index in 0..sample_count {
        let start = r.position() as u64;
        let length_bytes = r.u32_le()?;
        let loop_start_bytes = r.u32_le()?;
        let loop_length_bytes = r.u32_le()?;
        let volume = r.u8()?.min(64);
        let finetune = r.i8()?;
        let kind = r.u8()?;
        let pan = r.u8()?;
        let relative_note = r.i8()?;
        let reserved = r.u8()?;
        let name = r.string(22)?;
        r.seek(start + u64::from(sample_header_size.max(SAMPLE_HEADER_LEN)))?;

        instrument.subinstruments.push(SubInstrument {
            sample: Some(SampleId(index as u16)),
            volume,
            finetune,
            relative_note,
            pan: Some(pan),
            vibrato,
            ..SubInstrument::default()
        });
        headers.push(SampleHeader {
            name,
            length_bytes,
            loop_start_bytes,
            loop_length_bytes,
            loop_mode: match kind & 3 {
                1 => LoopMode::Forward,
                2 => LoopMode::PingPong,
                _ => LoopMode::None,
            },
            sixteen_bit: kind & SAMPLE_16BIT != 0,
            adpcm: reserved == RESERVED_ADPCM,
        });
    }

    if headers.iter().any(|h| h.adpcm) {
        builder.note_unsupported("ADPCM samples", format!("instrument '{}'", instrument.name));
    }

    Ok(PendingInstrument { instrument, headers })
}

impl PendingInstrument {
    /// Read the sample data that follows the headers
    pub(super) fn read_samples(
        self,
        r: &mut ByteReader<'_>,
        builder: &mut ModuleBuilder,
    ) -> Result<InstrumentDraft, FormatError> {
        let PendingInstrument { instrument, headers } = self;
        let mut samples = Vec::with_capacity(headers.len());

        for header in headers {
            if header.adpcm {
                // 16-byte delta table and packed nibbles, kept out of the model
                let packed = header.length_bytes.div_ceil(2) as usize + 16;
                r.bytes_lenient(packed);
                samples.push(Sample {
                    name: header.name,
                    ..Sample::default()
                });
                continue;
            }

            let frame_bytes = if header.sixteen_bit { 2 } else { 1 };
            let length = header.length_bytes / frame_bytes;
            let loop_start = header.loop_start_bytes / frame_bytes;
            let loop_end = loop_start.saturating_add(header.loop_length_bytes / frame_bytes);
            let mut sample = Sample {
                name: header.name,
                length,
                looping: SampleLoop::clamped(header.loop_mode, loop_start, loop_end, length),
                format: SampleFormat {
                    bits: if header.sixteen_bit { 16 } else { 8 },
                    stereo: false,
                    encoding: SampleEncoding::DeltaPcm,
                },
                ..Sample::default()
            };
            read_sample_data(r, builder, &mut sample)?;
            // An odd byte of a 16-bit sample is still part of the stream
            if header.length_bytes % frame_bytes != 0 {
                r.bytes_lenient(1);
            }
            samples.push(sample);
        }

        Ok(InstrumentDraft::owned(instrument, samples))
    }
}

/// Twelve (tick, value) pairs; values are re-centred by `centre`
fn read_points(r: &mut ByteReader<'_>, centre: i16) -> Result<Vec<EnvelopePoint>, FormatError> {
    let mut points = Vec::with_capacity(ENVELOPE_POINTS);
    for _ in 0..ENVELOPE_POINTS {
        let tick = r.u16_le()?;
        let value = (r.u16_le()?.min(64) as i16 - centre) as i8;
        points.push(EnvelopePoint { tick, value });
    }
    Ok(points)
}

fn build_envelope(
    mut points: Vec<EnvelopePoint>,
    count: usize,
    kind: u8,
    sustain: u8,
    loop_range: (u8, u8),
) -> Envelope {
    points.truncate(count.min(ENVELOPE_POINTS));
    Envelope::sanitized(
        points,
        (kind & 4 != 0).then_some(loop_range),
        (kind & 2 != 0).then_some((sustain, sustain)),
        kind & 1 != 0,
    )
}
