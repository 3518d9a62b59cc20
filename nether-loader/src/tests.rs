use super::*;
use nether_tracker::{ModelError, ResourceLedger};

/// Four-channel "M.K." module with one 16-frame sample and one empty pattern
fn minimal_mod() -> Vec<u8> {
    let mut data = vec![0u8; 20];
    for i in 0..31 {
        let mut record = vec![0u8; 30];
        if i == 0 {
            record[22..24].copy_from_slice(&8u16.to_be_bytes());
            record[25] = 64;
            record[28..30].copy_from_slice(&1u16.to_be_bytes());
        }
        data.extend(record);
    }
    data.extend([1, 0x7F]);
    data.extend([0u8; 128]);
    data.extend(b"M.K.");
    data.extend(vec![0u8; 64 * 4 * 4]);
    data.extend([0x10u8; 16]);
    data
}

/// Galaxy 4.0 stream holding only its MAIN chunk
fn minimal_gal4(channels: u8) -> Vec<u8> {
    let mut main = vec![0u8; 64];
    main.extend([0, channels, 6, 125, 0, 0, 0, 0, 0]);
    let mut data = b"RIFF".to_vec();
    data.extend((main.len() as u32 + 12).to_le_bytes());
    data.extend(b"AMFFMAIN");
    data.extend((main.len() as u32).to_le_bytes());
    data.extend(main);
    data
}

#[test]
fn test_unrecognized_streams() {
    assert!(matches!(load_module(&[]), Err(LoadError::FormatUnrecognized)));
    assert!(matches!(
        load_module(&[0xFF; 4096]),
        Err(LoadError::FormatUnrecognized)
    ));
    assert_eq!(probe_format(&[0u8; 2048]), None);
}

#[test]
fn test_probe_order() {
    assert_eq!(probe_format(&minimal_mod()), Some(Format::Mod));
    assert_eq!(probe_format(&minimal_gal4(4)), Some(Format::Gal4));
    assert_eq!(probe_format(b"IMPM"), Some(Format::It));
    assert_eq!(Format::PROBE_ORDER[0], Format::Xm);
    assert_eq!(Format::PROBE_ORDER[4], Format::Mod);
}

#[test]
fn test_recognized_but_truncated_does_not_fall_through() {
    let mut data = b"IMPM".to_vec();
    data.extend([0u8; 20]);
    match load_module(&data) {
        Err(LoadError::MalformedData { format, source }) => {
            assert_eq!(format, FormatId::ImpulseTracker);
            assert!(matches!(source, Malformed::Read(ReadError::UnexpectedEof { .. })));
        }
        other => panic!("expected malformed data, got {:?}", other.map(|l| l.format)),
    }
}

#[test]
fn test_load_as_wrong_format_is_unrecognized() {
    let data = minimal_mod();
    assert!(matches!(
        load_as(Format::Xm, &data, &LoadOptions::default()),
        Err(LoadError::FormatUnrecognized)
    ));
    let loaded = load_as(Format::Mod, &data, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.module.channels(), 4);
}

#[test]
fn test_load_options_from_toml() {
    let options: LoadOptions = toml::from_str(
        r#"
        duplicate_policy = "last_wins"

        [limits]
        max_channels = 2
        "#,
    )
    .unwrap();
    assert_eq!(options.duplicate_policy, Some(DuplicatePolicy::LastWins));
    assert_eq!(options.limits.max_channels, 2);
    assert_eq!(options.limits.max_rows, Limits::default().max_rows);
    assert!(options.ledger.is_none());

    let empty: LoadOptions = toml::from_str("").unwrap();
    assert_eq!(empty.duplicate_policy, None);
}

#[test]
fn test_limits_reject_oversized_declarations() {
    let options = LoadOptions {
        limits: Limits {
            max_channels: 2,
            ..Limits::default()
        },
        ..LoadOptions::default()
    };
    match load_module_with(&minimal_gal4(4), &options) {
        Err(LoadError::MalformedData {
            source: Malformed::Model(ModelError::TooManyChannels { .. }),
            ..
        }) => {}
        other => panic!("expected channel limit, got {:?}", other.map(|l| l.format)),
    }
}

#[test]
fn test_repeated_loads_release_everything() {
    let ledger = ResourceLedger::new();
    let options = LoadOptions {
        ledger: Some(ledger.clone()),
        ..LoadOptions::default()
    };
    let data = minimal_mod();
    for _ in 0..10 {
        let loaded = load_module_with(&data, &options).unwrap();
        assert_eq!(loaded.module.samples()[0].payload.len(), 16);
        assert!(ledger.live() > 0);
    }
    assert!(ledger.allocated() >= 10);
    assert!(ledger.is_balanced());
}

#[test]
fn test_truncated_sample_loads_degraded() {
    let mut data = minimal_mod();
    data.truncate(data.len() - 6);
    let loaded = load_module(&data).unwrap();
    assert!(loaded.is_degraded());
    assert_eq!(loaded.module.samples()[0].length, 10);
    assert_eq!(loaded.module.unsupported()[0].feature, "truncated sample data");
}
