//! Takeover configuration.

use crate::hal::HandlerAddr;
use crate::regs::IntBits;
use crate::saved::TimerLatches;
use crate::vectors::VECTOR_COUNT;

/// Timer latch the engine starts with: the longest period a CIA supports.
pub const DEFAULT_ENGINE_TICKS: u16 = 0xFFFF;

/// What the engine installs whenever it owns the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Entry points for the level 1..7 autovectors.
    pub engine_vectors: [HandlerAddr; VECTOR_COUNT],
    /// Interrupt sources enabled while the engine owns the machine.
    pub engine_interrupts: IntBits,
    /// Engine CIA timer latches until changed with `set_timer`.
    pub initial_timers: TimerLatches,
}

impl SystemConfig {
    /// Configuration with the default interrupt set and timer latches.
    pub const fn new(engine_vectors: [HandlerAddr; VECTOR_COUNT]) -> Self {
        Self {
            engine_vectors,
            engine_interrupts: IntBits::ENGINE_DEFAULT,
            initial_timers: TimerLatches::splat(DEFAULT_ENGINE_TICKS),
        }
    }

    /// Replaces the engine interrupt set.
    #[must_use]
    pub const fn with_interrupts(mut self, interrupts: IntBits) -> Self {
        self.engine_interrupts = interrupts;
        self
    }

    /// Replaces the initial engine timer latches.
    #[must_use]
    pub const fn with_timers(mut self, timers: TimerLatches) -> Self {
        self.initial_timers = timers;
        self
    }
}
