//! Song flow: ticks to rows, rows to orders

use tracing::debug;

use nether_tracker::{Module, Order};

use super::Sequencer;
use crate::channel::LoopState;
use crate::command::Position;

impl Sequencer {
    /// Move to the tick after the one just played
    pub(super) fn advance(&mut self, module: &Module) {
        let ticks = u16::from(self.speed) + u16::from(self.extra_ticks);
        self.position.tick += 1;
        if self.position.tick < ticks {
            return;
        }
        self.position.tick = 0;

        if self.row_repeats > 0 {
            self.row_repeats -= 1;
            self.repeating = true;
            return;
        }
        self.repeating = false;
        self.extra_ticks = 0;

        let globals = std::mem::take(&mut self.globals);
        if let Some(row) = globals.loop_row {
            self.position.row = row;
            return;
        }
        if globals.jump_order.is_some() || globals.break_row.is_some() {
            let order = globals
                .jump_order
                .unwrap_or_else(|| self.position.order.saturating_add(1));
            self.enter_order(module, order, globals.break_row.unwrap_or(0));
            return;
        }

        self.position.row += 1;
        let rows = module
            .pattern_at_order(self.position.order)
            .map_or(0, |(_, pattern)| pattern.rows());
        if self.position.row >= rows {
            self.enter_order(module, self.position.order.saturating_add(1), 0);
        }
    }

    /// Continue at `row` of the first playable order from `order` on
    ///
    /// Skip markers and empty patterns are passed over. Running off the end
    /// wraps to the restart position when the song loops, otherwise the song
    /// finishes.
    pub(super) fn enter_order(&mut self, module: &Module, order: u16, row: u16) {
        let length = module.orders().len();
        let mut order = order;
        let mut wrapped = false;

        for _ in 0..=length.saturating_mul(2) {
            match module.order(order) {
                Some(Order::Pattern(_)) => {
                    if let Some((_, pattern)) = module.pattern_at_order(order)
                        && pattern.rows() > 0
                    {
                        if order != self.position.order || wrapped {
                            self.reset_loops();
                        }
                        let row = if row < pattern.rows() { row } else { 0 };
                        self.position = Position { order, row, tick: 0 };
                        return;
                    }
                    order = order.saturating_add(1);
                }
                Some(Order::Skip) => order = order.saturating_add(1),
                Some(Order::End) | None => {
                    if !self.loop_song || wrapped {
                        break;
                    }
                    wrapped = true;
                    let restart = module.header().restart_position;
                    order = if usize::from(restart) < length { restart } else { 0 };
                    debug!("Song end reached, restarting at order {}", order);
                }
            }
        }

        self.finished = true;
    }

    fn reset_loops(&mut self) {
        self.shared_loop = LoopState::default();
        for channel in &mut self.channels {
            channel.loop_state = LoopState::default();
        }
    }
}
