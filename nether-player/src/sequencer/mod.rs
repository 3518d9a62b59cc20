//! Tick-driven event processor
//!
//! One call to [`Sequencer::tick`] is one unit of work:
//!
//! 1. On the first tick of a row, resolve the row's event on every channel
//!    (note and instrument, lone instrument, volume column, effects).
//! 2. Run continuing effects on every channel.
//! 3. Apply song-wide changes collected in steps 1-2 (speed, tempo, global
//!    volume, jumps).
//! 4. Emit one [`ChannelIntent`] per channel.
//!
//! Channels never observe each other's current-tick changes: song-wide
//! requests are collected first and only applied in step 3.
//!
//! Every behavioural fork reads the module's [`Quirks`]; no code here looks
//! at the format a module came from.

mod effects;
mod flow;
mod row;
mod tick;

use smallvec::SmallVec;

use nether_tracker::{Module, PeriodMode, QuirkFlags, Quirks};

use crate::channel::{ChannelState, LoopState};
use crate::command::Position;
use crate::intent::ChannelIntent;
use crate::utils;

pub(crate) const MIN_TEMPO: u8 = 32;
pub(crate) const GLOBAL_VOLUME_MAX: u8 = 128;

/// Read-only view of the module shared by the row and tick passes
pub(crate) struct Ctx<'a> {
    pub module: &'a Module,
    pub quirks: &'a Quirks,
    pub mode: PeriodMode,
    pub row: u16,
}

impl<'a> Ctx<'a> {
    fn new(module: &'a Module, row: u16) -> Self {
        Self {
            module,
            quirks: module.quirks(),
            mode: module.header().period_mode,
            row,
        }
    }

    pub fn has(&self, flag: QuirkFlags) -> bool {
        self.quirks.has(flag)
    }

    /// Clamp a period to the range the module allows
    pub fn clamp_period(&self, period: i32) -> i32 {
        utils::clamp_period(self.mode, period, self.has(QuirkFlags::AMIGA_LIMITS))
    }
}

/// Song-wide requests collected while a row is processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RowGlobals {
    pub speed: Option<u8>,
    pub tempo: Option<u8>,
    /// Tempo change per tick after the first
    pub tempo_slide: Option<i32>,
    pub global_volume: Option<u8>,
    /// Global volume change per tick after the first
    pub global_volume_slide: Option<i32>,
    /// One-off global volume change on the first tick
    pub global_volume_fine: i32,
    pub jump_order: Option<u16>,
    pub break_row: Option<u16>,
    /// Row a pattern loop returns to
    pub loop_row: Option<u16>,
    pub pattern_delay: Option<u8>,
    pub fine_delay: u8,
}

/// Per-channel event processor for one module
#[derive(Debug, Clone)]
pub struct Sequencer {
    channels: Vec<ChannelState>,
    position: Position,
    speed: u8,
    tempo: u8,
    global_volume: u8,
    globals: RowGlobals,
    /// Pattern loop shared by all channels when the module asks for it
    shared_loop: LoopState,
    /// Remaining repetitions of the current row (pattern delay)
    row_repeats: u8,
    /// The current row is a repetition; its events are not read again
    repeating: bool,
    /// Ticks added to the current row (fine pattern delay)
    extra_ticks: u8,
    loop_song: bool,
    finished: bool,
    ticks_played: u64,
}

impl Sequencer {
    /// Sequencer positioned on the first playable order
    pub fn new(module: &Module, loop_song: bool) -> Self {
        let header = module.header();
        let mut sequencer = Self {
            channels: Self::initial_channels(module),
            position: Position::default(),
            speed: header.initial_speed.max(1),
            tempo: header.initial_tempo.max(MIN_TEMPO),
            global_volume: header.global_volume.min(GLOBAL_VOLUME_MAX),
            globals: RowGlobals::default(),
            shared_loop: LoopState::default(),
            row_repeats: 0,
            repeating: false,
            extra_ticks: 0,
            loop_song,
            finished: false,
            ticks_played: 0,
        };
        sequencer.enter_order(module, 0, 0);
        sequencer
    }

    fn initial_channels(module: &Module) -> Vec<ChannelState> {
        let header = module.header();
        (0..module.channels())
            .map(|ch| {
                ChannelState::new(
                    ch,
                    header.channel_pan.get(ch as usize).copied().unwrap_or(128),
                    header.channel_volume.get(ch as usize).copied().unwrap_or(64),
                )
            })
            .collect()
    }

    /// Advance one tick, writing one intent per channel into `intents`
    ///
    /// Returns the position the tick was played at.
    pub fn tick(
        &mut self,
        module: &Module,
        intents: &mut SmallVec<[ChannelIntent; 32]>,
    ) -> Position {
        intents.clear();
        let position = self.position;

        if self.finished {
            for channel in &mut self.channels {
                if channel.is_active() {
                    channel.cut();
                }
                intents.push(channel.take_intent());
            }
            return position;
        }

        let ctx = Ctx::new(module, position.row);
        let first = position.tick == 0 && !self.repeating;
        if first {
            self.process_row(&ctx);
        }
        for index in 0..self.channels.len() {
            tick::process_channel(&mut self.channels[index], position.tick, &ctx);
        }
        self.apply_globals(first, position.tick);
        intents.extend(self.channels.iter_mut().map(ChannelState::take_intent));

        self.ticks_played += 1;
        self.advance(module);
        position
    }

    /// Song-wide changes, after every channel has been processed
    fn apply_globals(&mut self, first: bool, tick: u16) {
        let globals = self.globals;
        if first {
            if let Some(speed) = globals.speed {
                self.speed = speed;
            }
            if let Some(tempo) = globals.tempo {
                self.tempo = tempo.max(MIN_TEMPO);
            }
            if let Some(volume) = globals.global_volume {
                self.global_volume = volume.min(GLOBAL_VOLUME_MAX);
            }
            self.slide_global_volume(globals.global_volume_fine);
            if let Some(delay) = globals.pattern_delay {
                self.row_repeats = delay;
            }
            self.extra_ticks = globals.fine_delay;
        }
        if tick > 0 {
            if let Some(delta) = globals.tempo_slide {
                self.tempo = (i32::from(self.tempo) + delta).clamp(i32::from(MIN_TEMPO), 255) as u8;
            }
            if let Some(delta) = globals.global_volume_slide {
                self.slide_global_volume(delta);
            }
        }
    }

    fn slide_global_volume(&mut self, delta: i32) {
        self.global_volume =
            (i32::from(self.global_volume) + delta).clamp(0, i32::from(GLOBAL_VOLUME_MAX)) as u8;
    }

    /// Key off every channel (voices follow through the intents)
    pub fn release_all(&mut self, module: &Module) {
        let ctx = Ctx::new(module, self.position.row);
        for channel in &mut self.channels {
            row::key_off(channel, &ctx);
        }
    }

    /// Stop the song; the next tick cuts whatever still sounds
    pub fn stop(&mut self) {
        self.finished = true;
    }

    /// Continue at the start of order `order`
    ///
    /// Channel state is reset; speed, tempo and global volume are kept.
    /// Returns `false` when no playable pattern is found from there on.
    pub fn seek_to_order(&mut self, module: &Module, order: u16) -> bool {
        self.channels = Self::initial_channels(module);
        self.globals = RowGlobals::default();
        self.shared_loop = LoopState::default();
        self.row_repeats = 0;
        self.repeating = false;
        self.extra_ticks = 0;
        self.finished = false;
        self.position = Position::default();
        self.enter_order(module, order, 0);
        !self.finished
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn ticks_played(&self) -> u64 {
        self.ticks_played
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn channel(&self, index: u8) -> Option<&ChannelState> {
        self.channels.get(index as usize)
    }
}

#[cfg(test)]
mod tests;
