//! Per-format parsers and the helpers they share

use nether_tracker::{ModuleBuilder, Sample, SampleEncoding, SampleLoop, SamplePayload};

use crate::error::FormatError;
use crate::reader::ByteReader;

pub(crate) mod gal4;
pub(crate) mod it;
pub(crate) mod protracker;
pub(crate) mod s3m;
pub(crate) mod xm;

/// Read a sample's payload and attach it to `sample`
///
/// `sample.length` and `sample.format` must already be set. The declared size
/// is checked against the builder limits before anything is copied. Data cut
/// short by the end of the file shrinks the sample instead of failing the
/// load; the shortfall is recorded as an unsupported feature. Stereo data is
/// expected as a left block followed by a right block and is stored
/// interleaved.
pub(crate) fn read_sample_data(
    reader: &mut ByteReader<'_>,
    builder: &mut ModuleBuilder,
    sample: &mut Sample,
) -> Result<(), FormatError> {
    builder.check_sample_frames(u64::from(sample.length))?;
    let channel_bytes = usize::from(sample.format.bits / 8).max(1);
    let declared = sample
        .format
        .byte_len(sample.length)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| crate::error::structure("sample size overflows"))?;
    let bytes = reader.bytes_lenient(declared);

    let (mut data, frames) = if sample.format.stereo {
        let block = sample.length as usize * channel_bytes;
        let (left, right) = bytes.split_at(block.min(bytes.len()));
        let frames = left.len().min(right.len()) / channel_bytes;
        let mut data = Vec::with_capacity(frames * channel_bytes * 2);
        for (l, r) in left
            .chunks_exact(channel_bytes)
            .zip(right.chunks_exact(channel_bytes))
            .take(frames)
        {
            data.extend_from_slice(l);
            data.extend_from_slice(r);
        }
        (data, frames as u32)
    } else {
        let frames = bytes.len() / channel_bytes;
        (bytes[..frames * channel_bytes].to_vec(), frames as u32)
    };

    if frames < sample.length {
        builder.note_unsupported(
            "truncated sample data",
            format!("sample '{}' has {} of {} frames", sample.name, frames, sample.length),
        );
        sample.length = frames;
        sample.looping = clamp_loop(sample.looping, frames);
        sample.sustain = clamp_loop(sample.sustain, frames);
    }

    if sample.format.encoding == SampleEncoding::DeltaPcm {
        decode_delta(&mut data, sample.format.bits);
        sample.format.encoding = SampleEncoding::SignedPcm;
    }
    sample.payload = SamplePayload::new(data, builder.ledger());
    Ok(())
}

fn clamp_loop(lp: SampleLoop, length: u32) -> SampleLoop {
    SampleLoop::clamped(lp.mode, lp.start, lp.end, length)
}

/// Undo delta encoding in place (8-bit or little-endian 16-bit)
pub(crate) fn decode_delta(data: &mut [u8], bits: u8) {
    if bits == 16 {
        let mut acc: u16 = 0;
        for pair in data.chunks_exact_mut(2) {
            acc = acc.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
            pair.copy_from_slice(&acc.to_le_bytes());
        }
    } else {
        let mut acc: u8 = 0;
        for byte in data.iter_mut() {
            acc = acc.wrapping_add(*byte);
            *byte = acc;
        }
    }
}

/// Panning 0-64 (S3M/IT/XM style) scaled to 0-255
pub(crate) fn pan_from_64(pan: u8) -> u8 {
    (u16::from(pan.min(64)) * 255 / 64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delta_8bit() {
        let mut data = [10, 5, 0xFB, 0];
        decode_delta(&mut data, 8);
        assert_eq!(data, [10, 15, 10, 10]);
    }

    #[test]
    fn test_decode_delta_16bit() {
        let mut data = [0x00, 0x01, 0x01, 0x00, 0xFF, 0xFF];
        decode_delta(&mut data, 16);
        assert_eq!(data, [0x00, 0x01, 0x01, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_stereo_blocks_are_interleaved() {
        let bytes = [1, 2, 3, 10, 20, 30];
        let mut reader = ByteReader::new(&bytes);
        let mut builder = ModuleBuilder::new(
            nether_tracker::FormatInfo::new(nether_tracker::FormatId::ImpulseTracker),
            1,
            nether_tracker::Limits::default(),
        )
        .unwrap();
        let mut sample = Sample {
            length: 3,
            format: nether_tracker::SampleFormat {
                bits: 8,
                stereo: true,
                encoding: SampleEncoding::SignedPcm,
            },
            ..Sample::default()
        };
        read_sample_data(&mut reader, &mut builder, &mut sample).unwrap();
        assert_eq!(sample.payload.bytes(), &[1u8, 10, 2, 20, 3, 30][..]);
        assert_eq!(sample.length, 3);
    }

    #[test]
    fn test_pan_scaling() {
        assert_eq!(pan_from_64(0), 0);
        assert_eq!(pan_from_64(32), 127);
        assert_eq!(pan_from_64(64), 255);
        assert_eq!(pan_from_64(200), 255);
    }
}
