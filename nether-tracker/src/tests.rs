//! Tests for the module model, builder and quirk table

use super::*;

fn sample(name: &str, frames: u32, ledger: Option<&ResourceLedger>) -> Sample {
    Sample {
        name: name.to_string(),
        length: frames,
        payload: SamplePayload::new(vec![0; frames as usize], ledger),
        ..Sample::default()
    }
}

fn instrument_with(sample: u16, volume: u8) -> Instrument {
    Instrument::single(
        "ins",
        SubInstrument {
            sample: Some(SampleId(sample)),
            volume,
            ..SubInstrument::default()
        },
    )
}

fn builder(format: FormatId, channels: usize) -> ModuleBuilder {
    ModuleBuilder::new(FormatInfo::new(format), channels, Limits::default()).unwrap()
}

// =============================================================================
// Builder validation
// =============================================================================

#[test]
fn test_rejects_zero_and_oversized_channel_counts() {
    let limits = Limits::default();
    assert!(matches!(
        ModuleBuilder::new(FormatInfo::new(FormatId::ProTracker), 0, limits),
        Err(ModelError::TooManyChannels { .. })
    ));
    assert!(matches!(
        ModuleBuilder::new(FormatInfo::new(FormatId::ProTracker), 129, limits),
        Err(ModelError::TooManyChannels { count: 129, .. })
    ));
}

#[test]
fn test_rejects_pathological_pattern_dimensions() {
    let b = builder(FormatId::ImpulseTracker, 4);
    assert!(matches!(
        b.new_pattern(70_000, 4),
        Err(ModelError::TooManyRows { rows: 70_000, .. })
    ));
    assert!(matches!(
        b.new_pattern(64, 5),
        Err(ModelError::PatternWidth { channels: 5, module_channels: 4 })
    ));
    assert!(b.new_pattern(64, 4).is_ok());
}

#[test]
fn test_pattern_writes_outside_grid_are_rejected() {
    let mut pattern = Pattern::new(4, 2);
    assert!(pattern.set(3, 1, Event::EMPTY).is_ok());
    assert!(matches!(
        pattern.set(4, 0, Event::EMPTY),
        Err(ModelError::CellOutOfRange { row: 4, .. })
    ));
    assert!(pattern.event(0, 2).is_none());
    assert!(pattern.row(9).is_empty());
}

#[test]
fn test_sample_limits_checked_before_use() {
    let limits = Limits {
        max_samples: 1,
        max_sample_frames: 100,
        ..Limits::default()
    };
    let mut b = ModuleBuilder::new(FormatInfo::new(FormatId::ScreamTracker3), 4, limits).unwrap();
    assert!(b.check_sample_frames(101).is_err());
    b.add_sample(sample("a", 10, None)).unwrap();
    assert!(matches!(
        b.add_sample(sample("b", 10, None)),
        Err(ModelError::TooManySamples { max: 1 })
    ));
}

#[test]
fn test_dangling_references_normalized_to_none() {
    let mut b = builder(FormatId::ProTracker, 2);
    b.add_sample(sample("s", 16, None)).unwrap();
    b.add_instrument(InstrumentDraft::banked(instrument_with(0, 40))).unwrap();
    b.add_instrument(InstrumentDraft::banked(instrument_with(7, 40))).unwrap();

    let mut pattern = b.new_pattern(2, 2).unwrap();
    let event = Event {
        note: Note::On(60),
        instrument: Some(InstrumentId(9)),
        ..Event::EMPTY
    };
    pattern.set(0, 0, event).unwrap();
    let id = b.add_pattern(pattern).unwrap();
    b.set_orders(vec![Order::Pattern(id), Order::Pattern(PatternId(5))])
        .unwrap();

    let module = b.build().unwrap();
    let pattern = module.pattern(PatternId(0)).unwrap();
    assert_eq!(pattern.event(0, 0).unwrap().instrument, None);
    assert_eq!(module.orders()[1], Order::Skip);
    assert_eq!(module.instruments()[1].subinstruments[0].sample, None);
    assert!(!module.instruments()[1].is_valid_for(60));
    assert!(module.instruments()[0].is_valid_for(60));
}

#[test]
fn test_owned_samples_are_remapped_after_the_bank() {
    let mut b = builder(FormatId::FastTracker2, 2);
    b.add_sample(sample("bank", 4, None)).unwrap();
    let owned = vec![sample("a", 8, None), sample("b", 12, None)];
    let mut ins = instrument_with(1, 30);
    ins.subinstruments[0].sample = Some(SampleId(1));
    b.insert_instrument(0, InstrumentDraft::owned(ins, owned), DuplicatePolicy::FirstWins)
        .unwrap();

    let module = b.build().unwrap();
    assert_eq!(module.samples().len(), 3);
    let (sample_id, played) = module.sample_for(InstrumentId(0), 60).unwrap();
    assert_eq!(sample_id, SampleId(2));
    assert_eq!(played, 60);
    assert_eq!(module.sample(sample_id).unwrap().name, "b");
}

#[test]
fn test_empty_slots_become_silent_instruments() {
    let mut b = builder(FormatId::Galaxy4, 2);
    b.insert_instrument(3, InstrumentDraft::owned(instrument_with(0, 20), vec![sample("x", 4, None)]), DuplicatePolicy::Reject)
        .unwrap();
    let module = b.build().unwrap();
    assert_eq!(module.instruments().len(), 4);
    assert!(module.instruments()[0].subinstruments.is_empty());
    assert!(module.sample_for(InstrumentId(0), 60).is_none());
    assert!(module.sample_for(InstrumentId(3), 60).is_some());
}

// =============================================================================
// Duplicate slots and resource accounting
// =============================================================================

fn draft_with_samples(ledger: &ResourceLedger, volume: u8) -> InstrumentDraft {
    InstrumentDraft::owned(
        instrument_with(0, volume),
        vec![sample("s", 32, Some(ledger)), sample("t", 32, Some(ledger))],
    )
}

#[test]
fn test_first_wins_discards_and_releases_duplicate() {
    let ledger = ResourceLedger::new();
    {
        let mut b = builder(FormatId::Galaxy4, 1).with_ledger(Some(ledger.clone()));
        b.insert_instrument(0, draft_with_samples(&ledger, 10), DuplicatePolicy::FirstWins)
            .unwrap();
        b.insert_instrument(0, draft_with_samples(&ledger, 50), DuplicatePolicy::FirstWins)
            .unwrap();
        // Two samples plus the instrument of the first draft stay alive
        assert_eq!(ledger.live(), 3);

        let module = b.build().unwrap();
        assert_eq!(module.instruments()[0].subinstruments[0].volume, 10);
        assert_eq!(module.samples().len(), 2);
    }
    assert!(ledger.is_balanced());
}

#[test]
fn test_last_wins_replaces_and_releases_prior() {
    let ledger = ResourceLedger::new();
    {
        let mut b = builder(FormatId::Galaxy4, 1).with_ledger(Some(ledger.clone()));
        for volume in [10, 20, 30] {
            b.insert_instrument(0, draft_with_samples(&ledger, volume), DuplicatePolicy::LastWins)
                .unwrap();
        }
        assert_eq!(ledger.live(), 3);
        let module = b.build().unwrap();
        assert_eq!(module.instruments()[0].subinstruments[0].volume, 30);
    }
    assert!(ledger.is_balanced());
}

#[test]
fn test_last_wins_returns_replaced_samples_to_the_budget() {
    let ledger = ResourceLedger::new();
    let limits = Limits {
        max_samples: 2,
        max_sample_bytes: 64,
        ..Limits::default()
    };
    let mut b = ModuleBuilder::new(FormatInfo::new(FormatId::Galaxy4), 1, limits)
        .unwrap()
        .with_ledger(Some(ledger.clone()));
    for volume in [10, 20, 30, 40] {
        b.insert_instrument(0, draft_with_samples(&ledger, volume), DuplicatePolicy::LastWins)
            .unwrap();
    }
    assert_eq!(b.sample_count(), 2);

    // A replacement that does not fit leaves the current slot in place
    let oversized = InstrumentDraft::owned(
        instrument_with(0, 50),
        vec![sample("big", 65, Some(&ledger))],
    );
    assert!(matches!(
        b.insert_instrument(0, oversized, DuplicatePolicy::LastWins),
        Err(ModelError::SampleBudgetExceeded { max: 64 })
    ));
    assert_eq!(b.sample_count(), 2);
    let module = b.build().unwrap();
    assert_eq!(module.instruments()[0].subinstruments[0].volume, 40);
}

#[test]
fn test_reject_fails_and_dropping_builder_releases_everything() {
    let ledger = ResourceLedger::new();
    {
        let mut b = builder(FormatId::Galaxy4, 1).with_ledger(Some(ledger.clone()));
        b.insert_instrument(0, draft_with_samples(&ledger, 10), DuplicatePolicy::Reject)
            .unwrap();
        let err = b
            .insert_instrument(0, draft_with_samples(&ledger, 20), DuplicatePolicy::Reject)
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateInstrument { slot: 0 });
    }
    assert!(ledger.allocated() > 0);
    assert!(ledger.is_balanced());
}

#[test]
fn test_cloned_module_is_an_independent_owner() {
    let ledger = ResourceLedger::new();
    let mut b = builder(FormatId::Galaxy4, 1).with_ledger(Some(ledger.clone()));
    b.insert_instrument(0, draft_with_samples(&ledger, 10), DuplicatePolicy::Reject)
        .unwrap();
    let module = b.build().unwrap();
    let copy = module.clone();
    assert_eq!(ledger.live(), 6);
    drop(module);
    assert_eq!(ledger.live(), 3);
    drop(copy);
    assert!(ledger.is_balanced());
}

// =============================================================================
// Post-load mutation
// =============================================================================

#[test]
fn test_set_instrument_volume_only_touches_existing_entries() {
    let mut b = builder(FormatId::ImpulseTracker, 1);
    b.add_sample(sample("s", 4, None)).unwrap();
    b.add_instrument(InstrumentDraft::banked(instrument_with(0, 64))).unwrap();
    let mut module = b.build().unwrap();

    assert!(module.set_instrument_volume(InstrumentId(0), 0, 22));
    assert_eq!(module.instruments()[0].subinstruments[0].volume, 22);
    assert!(module.set_instrument_volume(InstrumentId(0), 0, 200));
    assert_eq!(module.instruments()[0].subinstruments[0].volume, 64);
    assert!(!module.set_instrument_volume(InstrumentId(0), 1, 10));
    assert!(!module.set_instrument_volume(InstrumentId(4), 0, 10));
}

// =============================================================================
// Quirk table
// =============================================================================

#[test]
fn test_portamento_instrument_table() {
    use InstrumentChange::*;
    let row = |format| {
        let q = Quirks::for_format(format, DialectFlags::empty());
        (
            q.porta_policy(true, true),
            q.porta_policy(false, true),
            q.porta_policy(false, false),
        )
    };
    assert_eq!(row(FormatId::ProTracker), (NewVolume, NewVolume, Cut));
    assert_eq!(row(FormatId::FastTracker2), (OldVolume, OldVolume, OldVolume));
    assert_eq!(row(FormatId::ImpulseTracker), (NewVolume, NewVolume, Continue));
    assert_eq!(row(FormatId::ScreamTracker3), (NewVolume, NewVolume, Continue));
}

#[test]
fn test_dialect_flags_select_quirk_variants() {
    let plain = Quirks::for_format(FormatId::ImpulseTracker, DialectFlags::empty());
    let linked = Quirks::for_format(
        FormatId::ImpulseTracker,
        DialectFlags::LINK_G_MEMORY | DialectFlags::OLD_EFFECTS,
    );
    assert_eq!(plain.effect_memory, EffectMemory::SharedPitchSlides);
    assert_eq!(linked.effect_memory, EffectMemory::LinkedPortamento);
    assert!(linked.has(QuirkFlags::OLD_EFFECTS));
    assert_eq!(linked.offset_beyond_end, OffsetBeyondEnd::Clamp);

    let st3 = Quirks::for_format(FormatId::ScreamTracker3, DialectFlags::FAST_VOLUME_SLIDES);
    assert!(st3.has(QuirkFlags::FAST_VOLUME_SLIDES));
    assert_eq!(st3.volume_column, VolumeColumn::Plain);
}

#[test]
fn test_informational_dialect_flags_leave_quirks_alone() {
    let informational = DialectFlags::SAMPLE_MODE | DialectFlags::SOUNDTRACKER | DialectFlags::MODPLUG;
    for format in [
        FormatId::ProTracker,
        FormatId::ScreamTracker3,
        FormatId::FastTracker2,
        FormatId::ImpulseTracker,
        FormatId::Galaxy4,
    ] {
        assert_eq!(
            Quirks::for_format(format, informational),
            Quirks::for_format(format, DialectFlags::empty()),
            "{:?}",
            format
        );
    }
}

// =============================================================================
// Envelopes
// =============================================================================

fn point(tick: u16, value: i8) -> EnvelopePoint {
    EnvelopePoint { tick, value }
}

#[test]
fn test_envelope_interpolation() {
    let env = Envelope::sanitized(vec![point(0, 0), point(10, 64), point(20, 32)], None, None, true);
    assert_eq!(env.value_at(0), 0);
    assert_eq!(env.value_at(5), 32);
    assert_eq!(env.value_at(15), 48);
    assert_eq!(env.value_at(100), 32);
    assert_eq!(env.last_tick(), 20);
}

#[test]
fn test_envelope_sanitizing_drops_bad_nodes_and_ranges() {
    let env = Envelope::sanitized(
        vec![point(0, 10), point(5, 20), point(3, 30), point(8, 40)],
        Some((1, 7)),
        Some((0, 1)),
        true,
    );
    assert_eq!(env.points.len(), 3);
    assert_eq!(env.loop_range, None);
    assert_eq!(env.sustain_range, Some((0, 1)));

    let empty = Envelope::sanitized(Vec::new(), None, None, true);
    assert!(!empty.enabled);
}

#[test]
fn test_loop_clamping() {
    let lp = SampleLoop::clamped(LoopMode::Forward, 10, 500, 100);
    assert_eq!(lp.end, 100);
    assert!(lp.is_active());
    assert!(!SampleLoop::clamped(LoopMode::Forward, 120, 500, 100).is_active());
}
