//! Envelope playback position

use nether_tracker::Envelope;

/// Tick position inside one instrument envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeCursor {
    pub tick: u16,
    /// Past the last node with no loop to return to
    pub finished: bool,
}

impl EnvelopeCursor {
    pub fn value(&self, envelope: &Envelope) -> i8 {
        envelope.value_at(self.tick)
    }

    /// Step one tick
    ///
    /// The sustain range holds (or loops) until the note is released; after
    /// that the regular loop applies.
    pub fn advance(&mut self, envelope: &Envelope, released: bool) {
        if self.finished {
            return;
        }

        let range = if released {
            envelope.loop_range
        } else {
            envelope.sustain_range.or(envelope.loop_range)
        };
        if let Some((start, end)) = range
            && let (Some(start), Some(end)) = (envelope.tick_of(start), envelope.tick_of(end))
            && self.tick >= end
        {
            self.tick = start;
            return;
        }

        if self.tick >= envelope.last_tick() {
            self.tick = envelope.last_tick();
            self.finished = true;
        } else {
            self.tick += 1;
        }
    }

    pub fn set_position(&mut self, tick: u16) {
        self.tick = tick;
        self.finished = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nether_tracker::EnvelopePoint;

    fn ramp(loop_range: Option<(u8, u8)>, sustain: Option<(u8, u8)>) -> Envelope {
        Envelope::sanitized(
            vec![
                EnvelopePoint { tick: 0, value: 64 },
                EnvelopePoint { tick: 4, value: 32 },
                EnvelopePoint { tick: 8, value: 0 },
            ],
            loop_range,
            sustain,
            true,
        )
    }

    #[test]
    fn test_runs_to_the_end() {
        let envelope = ramp(None, None);
        let mut cursor = EnvelopeCursor::default();
        for _ in 0..8 {
            assert!(!cursor.finished);
            cursor.advance(&envelope, false);
        }
        assert_eq!(cursor.tick, 8);
        cursor.advance(&envelope, false);
        assert!(cursor.finished);
        assert_eq!(cursor.value(&envelope), 0);
    }

    #[test]
    fn test_sustain_point_holds_until_release() {
        let envelope = ramp(None, Some((1, 1)));
        let mut cursor = EnvelopeCursor::default();
        for _ in 0..20 {
            cursor.advance(&envelope, false);
        }
        assert_eq!(cursor.tick, 4);
        assert_eq!(cursor.value(&envelope), 32);

        cursor.advance(&envelope, true);
        assert_eq!(cursor.tick, 5);
    }

    #[test]
    fn test_loop_wraps() {
        let envelope = ramp(Some((1, 2)), None);
        let mut cursor = EnvelopeCursor::default();
        let mut ticks = Vec::new();
        for _ in 0..12 {
            cursor.advance(&envelope, true);
            ticks.push(cursor.tick);
        }
        assert_eq!(&ticks[..10], &[1, 2, 3, 4, 5, 6, 7, 8, 4, 5]);
        assert!(!cursor.finished);
    }

    #[test]
    fn test_set_position_restarts_finished_cursor() {
        let envelope = ramp(None, None);
        let mut cursor = EnvelopeCursor {
            tick: 8,
            finished: true,
        };
        cursor.set_position(2);
        cursor.advance(&envelope, false);
        assert_eq!(cursor.tick, 3);
    }
}
