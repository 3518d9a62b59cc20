//! Sequencer tests against synthetic modules

use smallvec::SmallVec;

use nether_tracker::{
    Effect, Event, FormatId, Instrument, InstrumentId, Module, Note, Order, PeriodMode, SampleId,
};

use super::*;
use crate::channel::{ChannelStatus, VOLUME_SCALE};
use crate::intent::NoteAction;
use crate::test_support::*;

type Intents = SmallVec<[ChannelIntent; 32]>;

/// Play `ticks` ticks, returning each tick's position and intents
fn play(sequencer: &mut Sequencer, module: &Module, ticks: usize) -> Vec<(Position, Intents)> {
    (0..ticks)
        .map(|_| {
            let mut intents = Intents::new();
            let position = sequencer.tick(module, &mut intents);
            (position, intents)
        })
        .collect()
}

fn rows_played(frames: &[(Position, Intents)]) -> Vec<(u16, u16)> {
    frames
        .iter()
        .filter(|(position, _)| position.tick == 0)
        .map(|(position, _)| (position.order, position.row))
        .collect()
}

fn one_sample_song(format: FormatId) -> TestSong {
    TestSong::new(format, 1)
        .sample(sample(1000))
        .instrument(instrument(0, 32))
}

// =============================================================================
// Song flow
// =============================================================================

#[test]
fn test_rows_advance_after_speed_ticks() {
    let module = TestSong::new(FormatId::ProTracker, 1).speed(3).build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 12);

    let ticks: Vec<u16> = frames.iter().map(|(p, _)| p.tick).collect();
    assert_eq!(ticks, [0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2]);
    assert_eq!(rows_played(&frames), [(0, 0), (0, 1), (0, 2), (0, 3)]);
    assert!(sequencer.is_finished());
    assert_eq!(sequencer.ticks_played(), 12);
}

#[test]
fn test_loop_song_wraps_to_restart_position() {
    let module = TestSong::new(FormatId::ProTracker, 1)
        .speed(1)
        .cell(1, 0, 0, Event::EMPTY)
        .restart(1)
        .build();
    let mut sequencer = Sequencer::new(&module, true);
    let frames = play(&mut sequencer, &module, 10);

    assert!(!sequencer.is_finished());
    let rows = rows_played(&frames);
    assert_eq!(rows[7], (1, 3));
    assert_eq!(rows[8], (1, 0));
}

#[test]
fn test_markers_are_skipped_and_end_finishes() {
    let module = TestSong::new(FormatId::ImpulseTracker, 1)
        .speed(1)
        .cell(1, 0, 0, Event::EMPTY)
        .orders(vec![
            Order::Skip,
            Order::Pattern(nether_tracker::PatternId(0)),
            Order::End,
            Order::Pattern(nether_tracker::PatternId(1)),
        ])
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    assert_eq!(sequencer.position().order, 1);

    let frames = play(&mut sequencer, &module, 4);
    assert!(frames.iter().all(|(p, _)| p.order == 1));
    assert!(sequencer.is_finished());
}

#[test]
fn test_pattern_break_enters_next_order_at_row() {
    let module = TestSong::new(FormatId::ProTracker, 1)
        .speed(1)
        .cell(0, 1, 0, fx(Effect::PatternBreak(2)))
        .cell(1, 0, 0, Event::EMPTY)
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 4);

    assert_eq!(rows_played(&frames), [(0, 0), (0, 1), (1, 2), (1, 3)]);
    assert!(sequencer.is_finished());
}

#[test]
fn test_position_jump_with_break() {
    let module = TestSong::new(FormatId::FastTracker2, 2)
        .speed(1)
        .cell(0, 0, 0, fx(Effect::PositionJump(2)))
        .cell(0, 0, 1, fx(Effect::PatternBreak(3)))
        .cell(2, 0, 0, Event::EMPTY)
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 2);

    assert_eq!(rows_played(&frames), [(0, 0), (2, 3)]);
}

#[test]
fn test_pattern_loop_repeats_section() {
    let module = TestSong::new(FormatId::ProTracker, 1)
        .speed(1)
        .cell(0, 0, 0, fx(Effect::PatternLoop(0)))
        .cell(0, 1, 0, fx(Effect::PatternLoop(2)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 8);

    let rows: Vec<u16> = rows_played(&frames).into_iter().map(|(_, row)| row).collect();
    assert_eq!(rows, [0, 1, 0, 1, 0, 1, 2, 3]);
    assert!(sequencer.is_finished());
}

#[test]
fn test_shared_pattern_loop_across_channels() {
    // Loop start on channel 0, loop end on channel 1: only valid when shared
    let module = TestSong::new(FormatId::ScreamTracker3, 2)
        .speed(1)
        .cell(0, 1, 0, fx(Effect::PatternLoop(0)))
        .cell(0, 2, 1, fx(Effect::PatternLoop(1)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 6);

    let rows: Vec<u16> = rows_played(&frames).into_iter().map(|(_, row)| row).collect();
    assert_eq!(rows, [0, 1, 2, 1, 2, 3]);
}

#[test]
fn test_pattern_delay_repeats_row_without_retrigger() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(2)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::PatternDelay(1)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 5);

    let starts = frames
        .iter()
        .filter(|(_, intents)| intents[0].starts_note())
        .count();
    assert_eq!(starts, 1);
    assert!(frames[..4].iter().all(|(p, _)| p.row == 0));
    assert_eq!(frames[4].0.row, 1);
}

#[test]
fn test_speed_and_tempo_change_after_row() {
    let module = TestSong::new(FormatId::FastTracker2, 1)
        .cell(0, 0, 0, with_fx(fx(Effect::SetSpeed(2)), Effect::SetTempo(150)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    play(&mut sequencer, &module, 1);
    assert_eq!(sequencer.speed(), 2);
    assert_eq!(sequencer.tempo(), 150);

    let frames = play(&mut sequencer, &module, 2);
    assert_eq!(frames[1].0.row, 1);
}

#[test]
fn test_seek_keeps_timing() {
    let module = TestSong::new(FormatId::ProTracker, 1)
        .cell(0, 0, 0, fx(Effect::SetSpeed(3)))
        .cell(1, 0, 0, Event::EMPTY)
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    play(&mut sequencer, &module, 1);

    assert!(sequencer.seek_to_order(&module, 1));
    assert_eq!(sequencer.position(), Position { order: 1, row: 0, tick: 0 });
    assert_eq!(sequencer.speed(), 3);
    assert!(!sequencer.seek_to_order(&module, 9));
    assert!(sequencer.is_finished());
}

#[test]
fn test_finished_song_cuts_once() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(1)
        .cell(0, 0, 0, note(48, 0))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    play(&mut sequencer, &module, 4);
    assert!(sequencer.is_finished());

    let frames = play(&mut sequencer, &module, 2);
    assert_eq!(frames[0].1[0].action, NoteAction::Cut);
    assert_eq!(frames[1].1[0].action, NoteAction::Unchanged);
}

// =============================================================================
// Notes and instruments
// =============================================================================

#[test]
fn test_note_starts_at_reference_period() {
    let module = one_sample_song(FormatId::ProTracker)
        .cell(0, 0, 0, note(48, 0))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 1);

    let intent = frames[0].1[0];
    assert_eq!(intent.action, NoteAction::Start { offset: 0 });
    assert_eq!(intent.period, crate::utils::AMIGA_REFERENCE);
    assert_eq!(intent.volume, 32 * VOLUME_SCALE);
    assert_eq!(intent.instrument, Some(InstrumentId(0)));
    assert_eq!(intent.sample, Some(SampleId(0)));
    assert_eq!(intent.note, Some(48));
}

#[test]
fn test_it_porta_with_new_instrument_is_pending() {
    let module = TestSong::new(FormatId::ImpulseTracker, 1)
        .linear()
        .speed(1)
        .sample(sample(1000))
        .sample(sample(1000))
        .instrument(instrument(0, 22))
        .instrument(instrument(1, 33))
        .cell(0, 0, 0, note(60, 0))
        .cell(0, 1, 0, with_fx(note(64, 1), Effect::TonePorta(0x10)))
        .cell(0, 2, 0, bare_note(60))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 3);

    let start = frames[0].1[0];
    assert_eq!(start.volume, 22 * VOLUME_SCALE);

    let porta = frames[1].1[0];
    assert_eq!(porta.action, NoteAction::Unchanged);
    assert_eq!(porta.instrument, Some(InstrumentId(0)));
    assert_eq!(porta.sample, Some(SampleId(0)));
    assert_eq!(porta.volume, 33 * VOLUME_SCALE);
    assert_eq!(porta.period, start.period);

    let retrigger = frames[2].1[0];
    assert!(retrigger.starts_note());
    assert_eq!(retrigger.instrument, Some(InstrumentId(1)));
    assert_eq!(retrigger.sample, Some(SampleId(1)));
    assert_eq!(retrigger.volume, 33 * VOLUME_SCALE);
}

#[test]
fn test_xm_porta_with_new_instrument_keeps_old_volume() {
    let module = TestSong::new(FormatId::FastTracker2, 1)
        .linear()
        .speed(1)
        .sample(sample(1000))
        .sample(sample(1000))
        .instrument(instrument(0, 22))
        .instrument(instrument(1, 33))
        .cell(0, 0, 0, note(60, 0))
        .cell(0, 1, 0, with_fx(note(64, 1), Effect::TonePorta(0x10)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 2);

    let porta = frames[1].1[0];
    assert_eq!(porta.action, NoteAction::Unchanged);
    assert_eq!(porta.volume, 22 * VOLUME_SCALE);
    assert!(porta.envelopes.reset);
    assert!(sequencer.channel(0).unwrap().pending_instrument.is_none());
}

#[test]
fn test_tone_porta_slides_toward_target() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(3)
        .cell(0, 0, 0, note(48, 0))
        .cell(0, 1, 0, with_fx(bare_note(49), Effect::TonePorta(4)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 6);

    let start = frames[0].1[0].period;
    let target = crate::utils::note_period(PeriodMode::Amiga, 49, 0);
    assert_eq!(frames[3].1[0].period, start);
    assert_eq!(frames[4].1[0].period, start - 16);
    assert_eq!(frames[5].1[0].period, (start - 32).max(target));
    assert!(!frames[3].1[0].starts_note());
}

#[test]
fn test_invalid_instrument_follows_quirk() {
    for (format, cuts) in [(FormatId::ProTracker, true), (FormatId::ScreamTracker3, false)] {
        let module = one_sample_song(format)
            .instrument(Instrument::default())
            .speed(1)
            .cell(0, 0, 0, note(48, 0))
            .cell(0, 1, 0, note(50, 1))
            .build();
        let mut sequencer = Sequencer::new(&module, false);
        let frames = play(&mut sequencer, &module, 2);

        let intent = frames[1].1[0];
        if cuts {
            assert_eq!(intent.action, NoteAction::Cut, "{:?}", format);
        } else {
            assert_eq!(intent.action, NoteAction::Unchanged, "{:?}", format);
            assert_eq!(sequencer.channel(0).unwrap().status, ChannelStatus::Playing);
        }
    }
}

#[test]
fn test_key_off_without_envelope_cuts_in_xm() {
    let mut enveloped = instrument(0, 64);
    enveloped.volume_envelope = Some(sustain_envelope());
    let off = Event {
        note: Note::Off,
        ..Event::EMPTY
    };
    let module = TestSong::new(FormatId::FastTracker2, 2)
        .speed(1)
        .sample(sample(1000))
        .instrument(instrument(0, 64))
        .instrument(enveloped)
        .cell(0, 0, 0, note(48, 0))
        .cell(0, 0, 1, note(48, 1))
        .cell(0, 1, 0, off)
        .cell(0, 1, 1, off)
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 2);

    assert_eq!(frames[1].1[0].action, NoteAction::Cut);
    assert_eq!(frames[1].1[1].action, NoteAction::Release);
    assert_eq!(sequencer.channel(1).unwrap().status, ChannelStatus::Released);
}

#[test]
fn test_sample_offset_beyond_end() {
    for (format, offset_fx, expected) in [
        (FormatId::ProTracker, 2, NoteAction::Start { offset: 512 }),
        (FormatId::ProTracker, 8, NoteAction::Cut),
        (FormatId::ScreamTracker3, 8, NoteAction::Start { offset: 0 }),
    ] {
        let module = one_sample_song(format)
            .cell(0, 0, 0, with_fx(note(48, 0), Effect::SampleOffset(offset_fx)))
            .build();
        let mut sequencer = Sequencer::new(&module, false);
        let frames = play(&mut sequencer, &module, 1);
        assert_eq!(frames[0].1[0].action, expected, "{:?} {}", format, offset_fx);
    }
}

// =============================================================================
// Effects
// =============================================================================

#[test]
fn test_volume_slide_skips_first_tick() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(4)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::VolumeSlide(0x02)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 4);

    let volumes: Vec<u16> = frames.iter().map(|(_, intents)| intents[0].volume).collect();
    assert_eq!(volumes, [512, 480, 448, 416]);
}

#[test]
fn test_shared_memory_reuses_volume_slide_parameter() {
    let module = one_sample_song(FormatId::ScreamTracker3)
        .speed(4)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::VolumeSlide(0x02)))
        .cell(0, 1, 0, fx(Effect::PortaDown(0)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 8);

    let start = frames[0].1[0].period;
    assert_eq!(frames[7].1[0].period, start + 3 * 2 * crate::utils::SLIDE_UNIT);
}

#[test]
fn test_combined_fine_slide_acts_once() {
    let module = one_sample_song(FormatId::ImpulseTracker)
        .speed(4)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::VolumeSlide(0xF4)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 4);

    assert!(frames.iter().all(|(_, intents)| intents[0].volume == 28 * VOLUME_SCALE));
}

#[test]
fn test_xm_volume_column_pan_steps_by_sixteen() {
    let mut panned = note(48, 0);
    panned.volume = Some(0xCF);
    let mut centred = note(48, 0);
    centred.volume = Some(0xC8);
    let module = TestSong::new(FormatId::FastTracker2, 2)
        .linear()
        .sample(sample(1000))
        .instrument(instrument(0, 32))
        .cell(0, 0, 0, panned)
        .cell(0, 0, 1, centred)
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 1);

    assert_eq!(frames[0].1[0].pan, 240);
    assert_eq!(frames[0].1[1].pan, 128);
}

#[test]
fn test_note_delay_and_cut() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(4)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::NoteDelay(2)))
        .cell(0, 1, 0, with_fx(note(48, 0), Effect::NoteCut(1)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 8);

    let actions: Vec<NoteAction> = frames.iter().map(|(_, intents)| intents[0].action).collect();
    assert_eq!(actions[0], NoteAction::Unchanged);
    assert_eq!(actions[2], NoteAction::Start { offset: 0 });
    assert_eq!(actions[4], NoteAction::Start { offset: 0 });
    assert_eq!(actions[5], NoteAction::Cut);
    assert_eq!(frames[6].1[0].volume, 0);
}

#[test]
fn test_retrigger_restarts_in_place() {
    let module = one_sample_song(FormatId::ProTracker)
        .speed(6)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::Retrigger(2)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 6);

    let retriggers: Vec<u16> = frames
        .iter()
        .filter(|(_, intents)| intents[0].action == NoteAction::Retrigger)
        .map(|(p, _)| p.tick)
        .collect();
    assert_eq!(retriggers, [2, 4]);
}

#[test]
fn test_arpeggio_cycles_semitones() {
    let module = one_sample_song(FormatId::FastTracker2)
        .linear()
        .speed(3)
        .cell(0, 0, 0, with_fx(note(48, 0), Effect::Arpeggio(0x47)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 3);

    let base = crate::utils::LINEAR_REFERENCE;
    let periods: Vec<i32> = frames.iter().map(|(_, intents)| intents[0].period).collect();
    assert_eq!(periods, [base, base - 4 * 64, base - 7 * 64]);
}

#[test]
fn test_global_volume_is_song_wide() {
    let module = TestSong::new(FormatId::ImpulseTracker, 2)
        .cell(0, 0, 1, fx(Effect::GlobalVolume(64)))
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    assert_eq!(sequencer.global_volume(), 128);
    play(&mut sequencer, &module, 1);
    assert_eq!(sequencer.global_volume(), 64);
}

#[test]
fn test_new_note_action_override_reaches_intent() {
    let module = one_sample_song(FormatId::ImpulseTracker)
        .cell(
            0,
            0,
            0,
            with_fx(
                note(48, 0),
                Effect::SetNewNoteAction(nether_tracker::NewNoteAction::Continue),
            ),
        )
        .build();
    let mut sequencer = Sequencer::new(&module, false);
    let frames = play(&mut sequencer, &module, 1);
    assert_eq!(frames[0].1[0].nna, nether_tracker::NewNoteAction::Continue);
}
