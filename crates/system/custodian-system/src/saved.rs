//! What the host had before the engine took over.

use crate::hal::HandlerAddr;
use crate::regs::{CIA_COUNT, CiaTimer, CiaUnit, DmaBits, IntBits};
use crate::vectors::VECTOR_COUNT;

/// A latch value per CIA timer, indexed `[unit][timer]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerLatches([[u16; 2]; CIA_COUNT]);

impl TimerLatches {
    /// Every latch set to `ticks`.
    pub const fn splat(ticks: u16) -> Self {
        Self([[ticks; 2]; CIA_COUNT])
    }

    /// Latch of one timer.
    pub const fn get(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        self.0[unit.index()][timer.index()]
    }

    /// Sets the latch of one timer.
    pub fn set(&mut self, unit: CiaUnit, timer: CiaTimer, ticks: u16) {
        self.0[unit.index()][timer.index()] = ticks;
    }
}

impl Default for TimerLatches {
    fn default() -> Self {
        Self::splat(0)
    }
}

/// Snapshot of host state taken at takeover and on every host-to-engine
/// edge, used to put the machine back on the engine-to-host edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedHostState {
    /// INTENA as the host had it at takeover.
    pub intena: IntBits,
    /// DMA the host gets back. Starts as the takeover DMACON and follows
    /// the engine's DMA requests; host-critical channels never leave it.
    pub dmacon: DmaBits,
    /// DMACON at takeover, restored in full at shutdown.
    pub initial_dmacon: DmaBits,
    /// Host handlers of the patched vector slots.
    pub vectors: [HandlerAddr; VECTOR_COUNT],
    /// Host CIA timer latches.
    pub timers: TimerLatches,
}

impl SavedHostState {
    /// Empty snapshot.
    pub const fn new() -> Self {
        Self {
            intena: IntBits::empty(),
            dmacon: DmaBits::empty(),
            initial_dmacon: DmaBits::empty(),
            vectors: [HandlerAddr::NULL; VECTOR_COUNT],
            timers: TimerLatches::splat(0),
        }
    }
}

impl Default for SavedHostState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latches_are_independent() {
        let mut t = TimerLatches::default();
        t.set(CiaUnit::B, CiaTimer::A, 0x1000);
        assert_eq!(t.get(CiaUnit::B, CiaTimer::A), 0x1000);
        assert_eq!(t.get(CiaUnit::B, CiaTimer::B), 0);
        assert_eq!(t.get(CiaUnit::A, CiaTimer::A), 0);
    }
}
