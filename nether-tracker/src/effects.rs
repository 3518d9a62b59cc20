//! Unified effect commands
//!
//! Loaders translate each format's effect letters into these variants. Most
//! variants keep the raw parameter byte: a zero parameter frequently means
//! "reuse the last value", and which value counts as "last" depends on the
//! module's effect-memory quirk, so decoding happens at play time.

/// Unified effect command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// No effect
    #[default]
    None,

    // =========================================================================
    // Pitch
    // =========================================================================
    /// Cycle base note, +x, +y semitones
    Arpeggio(u8),
    /// Slide pitch up every tick after the first
    ///
    /// Under combined fine slides `Fx`/`Ex` parameters select fine/extra-fine.
    PortaUp(u8),
    /// Slide pitch down every tick after the first
    PortaDown(u8),
    /// Slide pitch up once on the first tick
    FinePortaUp(u8),
    /// Slide pitch down once on the first tick
    FinePortaDown(u8),
    /// Slide pitch up by quarter steps once on the first tick
    ExtraFinePortaUp(u8),
    /// Slide pitch down by quarter steps once on the first tick
    ExtraFinePortaDown(u8),
    /// Slide toward the row's note instead of retriggering
    TonePorta(u8),
    /// Continue tone portamento and slide volume
    TonePortaVolSlide(u8),
    /// Pitch oscillation (speed << 4 | depth)
    Vibrato(u8),
    /// Vibrato at a quarter of the depth
    FineVibrato(u8),
    /// Continue vibrato and slide volume
    VibratoVolSlide(u8),
    /// Set vibrato oscillator shape (bit 2 disables retrigger)
    VibratoWaveform(u8),
    /// Round tone portamento to semitones
    Glissando(bool),
    /// Override the sample finetune
    SetFinetune(u8),

    // =========================================================================
    // Volume
    // =========================================================================
    /// Set volume (0-64)
    SetVolume(u8),
    /// Slide volume every tick after the first
    ///
    /// Under combined fine slides `xF`/`Fx` parameters select a fine slide.
    VolumeSlide(u8),
    /// Raise volume once on the first tick
    FineVolumeSlideUp(u8),
    /// Lower volume once on the first tick
    FineVolumeSlideDown(u8),
    /// Volume oscillation (speed << 4 | depth)
    Tremolo(u8),
    /// Set tremolo oscillator shape
    TremoloWaveform(u8),
    /// Alternate full and zero volume (on << 4 | off)
    Tremor(u8),
    /// Set channel volume (0-64)
    ChannelVolume(u8),
    /// Slide channel volume
    ChannelVolumeSlide(u8),
    /// Set global volume (0-128)
    GlobalVolume(u8),
    /// Slide global volume
    GlobalVolumeSlide(u8),

    // =========================================================================
    // Panning
    // =========================================================================
    /// Set panning (0-255)
    SetPan(u8),
    /// Slide panning
    PanSlide(u8),

    // =========================================================================
    // Sample control
    // =========================================================================
    /// Start the sample at param × 256 frames (plus the high offset)
    SampleOffset(u8),
    /// High byte of the next sample offset (× 65536)
    SampleOffsetHigh(u8),
    /// Retrigger every x ticks
    Retrigger(u8),
    /// Retrigger with volume change (volume op << 4 | interval)
    MultiRetrigger(u8),
    /// Cut the note after x ticks
    NoteCut(u8),
    /// Start the row's note after x ticks
    NoteDelay(u8),
    /// Release the note at tick x
    KeyOff(u8),
    /// Jump the volume envelope to tick x
    SetEnvelopePosition(u8),
    /// Act on voices this channel left playing in the background
    PastNote(PastNoteAction),
    /// Override the instrument's new note action
    SetNewNoteAction(crate::NewNoteAction),
    /// Switch an instrument envelope on or off
    Envelope(EnvelopeToggle),

    // =========================================================================
    // Song flow and timing
    // =========================================================================
    /// Set speed (ticks per row)
    SetSpeed(u8),
    /// Set tempo (BPM)
    SetTempo(u8),
    /// Slide tempo every tick (0x0y down, 0x1y up)
    TempoSlide(u8),
    /// Continue at order position
    PositionJump(u8),
    /// Continue at row in next pattern (decoded row number)
    PatternBreak(u8),
    /// Pattern loop (0 sets the loop start)
    PatternLoop(u8),
    /// Repeat the row x times
    PatternDelay(u8),
    /// Extend the row by x ticks
    FinePatternDelay(u8),
}

impl Effect {
    /// Effects that act on the song rather than the channel
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Effect::SetSpeed(_)
                | Effect::SetTempo(_)
                | Effect::TempoSlide(_)
                | Effect::PositionJump(_)
                | Effect::PatternBreak(_)
                | Effect::PatternLoop(_)
                | Effect::PatternDelay(_)
                | Effect::FinePatternDelay(_)
                | Effect::GlobalVolume(_)
                | Effect::GlobalVolumeSlide(_)
        )
    }

    /// Effects that turn the row's note into a slide target
    pub fn is_tone_porta(&self) -> bool {
        matches!(self, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
    }
}

/// Past-note action (IT S70-S72)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PastNoteAction {
    Cut,
    Off,
    Fade,
}

/// Envelope switch (IT S77-S7C)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeToggle {
    VolumeOff,
    VolumeOn,
    PanOff,
    PanOn,
    PitchOff,
    PitchOn,
}
