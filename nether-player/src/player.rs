//! Playback session
//!
//! A [`Player`] pairs one [`Sequencer`] with one [`VoiceAllocator`] over a
//! shared, read-only [`Module`]. Any number of players may share the same
//! module; each owns its channel state and voice pool.

use std::sync::Arc;

use tracing::debug;

use nether_tracker::Module;

use crate::command::{Position, TickFrame};
use crate::config::{ConfigError, PlayerConfig};
use crate::sequencer::Sequencer;
use crate::utils;
use crate::voices::{MixParams, VoiceAllocator};

/// One playback session of a module
#[derive(Debug, Clone)]
pub struct Player {
    module: Arc<Module>,
    config: PlayerConfig,
    sequencer: Sequencer,
    voices: VoiceAllocator,
    /// Output of the most recent tick, reused between ticks
    frame: TickFrame,
}

impl Player {
    /// Start playing `module` with default settings at `sample_rate`
    pub fn start(module: Arc<Module>, sample_rate: u32) -> Result<Self, ConfigError> {
        Self::start_with(
            module,
            PlayerConfig {
                sample_rate,
                ..PlayerConfig::default()
            },
        )
    }

    pub fn start_with(module: Arc<Module>, config: PlayerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let channels = module.channels();
        let pool = config.voice_count(channels);
        debug!(
            "Starting playback: {} channels, {} voices, {} Hz",
            channels, pool, config.sample_rate
        );

        Ok(Self {
            sequencer: Sequencer::new(&module, config.loop_song),
            voices: VoiceAllocator::new(pool, channels, config.released_voice_policy),
            frame: TickFrame::default(),
            module,
            config,
        })
    }

    /// Play one tick and return everything it produced
    ///
    /// Once the song has ended, the first tick cuts every voice and reports
    /// `finished`; later ticks stay silent.
    pub fn advance_tick(&mut self) -> &TickFrame {
        let ending = self.sequencer.is_finished();
        let frame = &mut self.frame;

        frame.position = self.sequencer.tick(&self.module, &mut frame.intents);
        frame.speed = self.sequencer.speed();
        frame.tempo = self.sequencer.tempo();
        frame.global_volume = self.sequencer.global_volume();
        frame.samples = utils::samples_per_tick(u16::from(frame.tempo), self.config.sample_rate);
        frame.finished = ending;

        if ending {
            self.voices.cut_all();
        }
        let mix = MixParams {
            global_volume: frame.global_volume,
            samples: frame.samples,
            sample_rate: self.config.sample_rate,
        };
        self.voices
            .apply(&frame.intents, &self.module, mix, &mut frame.commands);
        &self.frame
    }

    /// Key off every channel; notes fade out through their envelopes
    pub fn release_all(&mut self) {
        self.sequencer.release_all(&self.module);
    }

    /// End the song; the next tick silences everything
    pub fn stop(&mut self) {
        self.sequencer.stop();
    }

    /// Jump to the start of order `order`, silencing every voice
    ///
    /// Returns `false` (and ends the song) when nothing playable follows.
    pub fn seek_to_order(&mut self, order: u16) -> bool {
        self.voices.cut_all();
        self.sequencer.seek_to_order(&self.module, order)
    }

    /// Output frames the next tick lasts at the current tempo
    pub fn samples_per_tick(&self) -> u32 {
        utils::samples_per_tick(u16::from(self.sequencer.tempo()), self.config.sample_rate)
    }

    /// Position the next tick plays at
    pub fn position(&self) -> Position {
        self.sequencer.position()
    }

    pub fn order(&self) -> u16 {
        self.sequencer.position().order
    }

    pub fn row(&self) -> u16 {
        self.sequencer.position().row
    }

    pub fn tick(&self) -> u16 {
        self.sequencer.position().tick
    }

    pub fn speed(&self) -> u8 {
        self.sequencer.speed()
    }

    pub fn tempo(&self) -> u8 {
        self.sequencer.tempo()
    }

    pub fn is_finished(&self) -> bool {
        self.sequencer.is_finished()
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn voices(&self) -> &VoiceAllocator {
        &self.voices
    }

    /// Output of the most recent tick
    pub fn frame(&self) -> &TickFrame {
        &self.frame
    }
}
