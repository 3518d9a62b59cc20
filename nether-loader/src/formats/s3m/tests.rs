use super::*;
use crate::{LoadError, load_module};
use nether_tracker::QuirkFlags;

const INSTRUMENT_OFFSET: usize = 0x90;
const SAMPLE_OFFSET: usize = 0xE0;
const PATTERN_OFFSET: usize = 0xF0;

/// Two-channel S3M with one sampled instrument and one pattern
fn build_s3m(instrument_kind: u8) -> Vec<u8> {
    let mut data = Vec::new();
    let mut title = b"s3m test".to_vec();
    title.resize(28, 0);
    data.extend(title);
    data.extend([0x1A, FILE_TYPE, 0, 0]);
    data.extend(2u16.to_le_bytes()); // orders
    data.extend(1u16.to_le_bytes()); // instruments
    data.extend(1u16.to_le_bytes()); // patterns
    data.extend(0u16.to_le_bytes()); // flags
    data.extend(0x1320u16.to_le_bytes());
    data.extend(2u16.to_le_bytes()); // unsigned samples
    data.extend(MAGIC);
    data.extend([64, 6, 125, 0xB0, 0, DEFAULT_PAN_MARKER]);
    data.extend([0u8; 10]);
    let mut settings = [255u8; 32];
    settings[0] = 0;
    settings[1] = 8;
    data.extend(settings);
    assert_eq!(data.len(), 0x60);

    data.extend([0, 255]);
    data.extend(((INSTRUMENT_OFFSET / 16) as u16).to_le_bytes());
    data.extend(((PATTERN_OFFSET / 16) as u16).to_le_bytes());
    let mut pans = [0x20u8 | 0x8; 32];
    pans[0] = 0x23;
    pans[1] = 0x2C;
    data.extend(pans);
    data.resize(INSTRUMENT_OFFSET, 0);

    data.push(instrument_kind);
    data.extend([0u8; 12]);
    data.extend([0, (SAMPLE_OFFSET / 16) as u8, 0]);
    data.extend(16u32.to_le_bytes());
    data.extend(0u32.to_le_bytes());
    data.extend(16u32.to_le_bytes());
    data.extend([50, 0, 0, SAMPLE_LOOP]);
    data.extend(8363u32.to_le_bytes());
    data.extend([0u8; 12]);
    let mut name = b"lead".to_vec();
    name.resize(28, 0);
    data.extend(name);
    data.extend(b"SCRS");
    assert_eq!(data.len(), SAMPLE_OFFSET);
    data.extend([0x80u8; 16]);

    let mut pattern = vec![
        0x20 | 0x40 | 0x80, 0x40, 1, 32, 1, 3, // channel 0: C-4, ins 1, vol 32, A03
        0x80 | 1, 3, 0x12, // channel 1: C12
        0,
    ];
    pattern.extend([0u8; 63]);
    data.extend((pattern.len() as u16 + 2).to_le_bytes());
    data.extend(pattern);
    data
}

#[test]
fn test_parse_minimal_s3m() {
    let loaded = load_module(&build_s3m(1)).unwrap();
    assert_eq!(loaded.format, Format::S3m);
    let module = loaded.module;
    assert_eq!(module.title(), "s3m test");
    assert_eq!(module.channels(), 2);
    assert_eq!(module.format().tracker, "Scream Tracker 3.20");
    assert_eq!(module.orders(), &[Order::Pattern(PatternId(0)), Order::End]);
    assert_eq!(module.header().channel_pan, vec![51u8, 204]);
    assert_eq!(module.header().global_volume, 128);
    assert!(module.quirks().has(QuirkFlags::GLOBAL_PATTERN_LOOP));

    let pattern = module.pattern(PatternId(0)).unwrap();
    let event = pattern.event(0, 0).unwrap();
    assert_eq!(event.note, Note::On(48));
    assert_eq!(event.instrument, Some(InstrumentId(0)));
    assert_eq!(event.volume, Some(32));
    assert_eq!(event.effects[0], Effect::SetSpeed(3));
    assert_eq!(pattern.event(0, 1).unwrap().effects[0], Effect::PatternBreak(12));
    assert!(pattern.event(1, 0).unwrap().is_empty());

    let sub = &module.instruments()[0].subinstruments[0];
    assert_eq!(sub.volume, 50);
    let sample = module.sample(sub.sample.unwrap()).unwrap();
    assert_eq!(sample.length, 16);
    assert_eq!(sample.c_rate, 8363);
    assert_eq!(sample.format.encoding, SampleEncoding::UnsignedPcm);
    assert!(sample.looping.is_active());
    assert_eq!(sample.payload.bytes(), &[0x80u8; 16][..]);
    assert!(module.unsupported().is_empty());
}

#[test]
fn test_adlib_instrument_is_inert() {
    let loaded = load_module(&build_s3m(2)).unwrap();
    assert!(loaded.is_degraded());
    assert_eq!(loaded.module.unsupported()[0].feature, "AdLib instruments");
    assert!(loaded.module.instruments()[0].subinstruments.is_empty());
    assert!(loaded.module.samples().is_empty());
}

#[test]
fn test_truncated_pattern_is_malformed() {
    let mut data = build_s3m(1);
    data.truncate(PATTERN_OFFSET + 8);
    match load_module(&data) {
        Err(LoadError::MalformedData { format, .. }) => assert_eq!(format, FormatId::ScreamTracker3),
        other => panic!("expected malformed data, got {:?}", other.map(|l| l.format)),
    }
}

#[test]
fn test_decode_note() {
    assert_eq!(decode_note(0x40), Note::On(48));
    assert_eq!(decode_note(0x5B), Note::On(71));
    assert_eq!(decode_note(254), Note::Cut);
    assert_eq!(decode_note(255), Note::None);
    assert_eq!(decode_note(0x4C), Note::None);
}

#[test]
fn test_fast_slides_from_old_tracker_version() {
    let mut data = build_s3m(1);
    data[0x28..0x2A].copy_from_slice(&0x1300u16.to_le_bytes());
    let module = load_module(&data).unwrap().module;
    assert!(module.format().dialect.contains(DialectFlags::FAST_VOLUME_SLIDES));
    assert!(module.quirks().has(QuirkFlags::FAST_VOLUME_SLIDES));
}
