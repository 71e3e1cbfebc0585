//! Engine DMA and CIA timer requests.
//!
//! Requests are recorded as the engine's desired state and reconciled with
//! the hardware at the ownership edges. A request made while the engine owns
//! the machine also reaches the hardware at once; a request made while the
//! host is active only does so when it cannot disturb the host.

use custodian_core::kwarn;

use crate::error::ConfigError;
use crate::hal::Chipset;
use crate::regs::{CiaTimer, CiaUnit, DmaBits, is_host_reserved};
use crate::saved::{SavedHostState, TimerLatches};

// ---------------------------------------------------------------------------
// DMA
// ---------------------------------------------------------------------------

/// The DMA channels the engine wants enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaController {
    want: DmaBits,
}

impl DmaController {
    /// Controller wanting no channels.
    pub const fn new() -> Self {
        Self {
            want: DmaBits::empty(),
        }
    }

    /// Channels currently wanted by the engine.
    pub const fn want(&self) -> DmaBits {
        self.want
    }

    /// Enables or disables one channel by bit number.
    pub fn set_channel<C: Chipset>(
        &mut self,
        chipset: &C,
        saved: &mut SavedHostState,
        bit: u8,
        enabled: bool,
        engine_owned: bool,
    ) -> Result<(), ConfigError> {
        if bit > DmaBits::LAST_CHANNEL_BIT {
            return Err(ConfigError::InvalidDmaChannel(bit));
        }
        let mask = DmaBits::from_bits_retain(1 << bit);
        self.set_mask(chipset, saved, mask, enabled, engine_owned);
        Ok(())
    }

    /// Enables or disables a set of channels.
    ///
    /// Enabled channels are also added to what the host gets back. Disabled
    /// channels are removed from it unless they are host-critical. The
    /// hardware is updated now for every channel while the engine owns the
    /// machine, and only for non-critical channels while the host is
    /// active; critical ones follow at the next release edge.
    pub fn set_mask<C: Chipset>(
        &mut self,
        chipset: &C,
        saved: &mut SavedHostState,
        mask: DmaBits,
        enabled: bool,
        engine_owned: bool,
    ) {
        if !DmaBits::CHANNELS.contains(mask) {
            kwarn!("[system] DMA mask {:#06x} has non-channel bits, ignoring them", mask.bits());
        }
        let mask = mask & DmaBits::CHANNELS;

        if enabled {
            self.want |= mask;
            saved.dmacon |= mask;
        } else {
            self.want -= mask;
            saved.dmacon -= mask - DmaBits::HOST_CRITICAL;
        }

        let now = if engine_owned {
            mask
        } else {
            mask - DmaBits::HOST_CRITICAL
        };
        if now.is_empty() {
            return;
        }
        if enabled {
            chipset.set_dmacon(DmaBits::SETCLR | now);
        } else {
            chipset.set_dmacon(now);
        }
    }

    /// Turns on the master enable and every wanted channel.
    pub fn apply_engine<C: Chipset>(&self, chipset: &C) {
        chipset.set_dmacon(DmaBits::SETCLR | DmaBits::MASTER | self.want);
    }

    /// Gives the host back its critical channels.
    pub fn restore_host<C: Chipset>(chipset: &C, saved: &SavedHostState) {
        chipset.set_dmacon(DmaBits::SETCLR | DmaBits::MASTER | (saved.dmacon & DmaBits::HOST_CRITICAL));
    }
}

impl Default for DmaController {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// CIA timer latches requested by the engine.
///
/// A running CIA timer cannot be read back reliably, so the desired latch
/// is stored here and written at every release edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequests {
    latches: TimerLatches,
}

impl TimerRequests {
    /// Requests starting from `initial`.
    pub const fn new(initial: TimerLatches) -> Self {
        Self { latches: initial }
    }

    /// Latch requested for one timer.
    pub const fn get(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        self.latches.get(unit, timer)
    }

    /// Records a request, and programs the timer now if the engine owns
    /// the machine.
    pub fn set<C: Chipset>(
        &mut self,
        chipset: &C,
        unit: CiaUnit,
        timer: CiaTimer,
        ticks: u16,
        engine_owned: bool,
    ) -> Result<(), ConfigError> {
        if is_host_reserved(unit, timer) {
            return Err(ConfigError::ReservedTimer(unit, timer));
        }
        self.latches.set(unit, timer, ticks);
        if engine_owned {
            chipset.set_timer(unit, timer, ticks);
        }
        Ok(())
    }

    /// Programs every engine timer.
    pub fn apply<C: Chipset>(&self, chipset: &C) {
        for_each_shared_timer(|unit, timer| chipset.set_timer(unit, timer, self.get(unit, timer)));
    }
}

/// Reads the host's latches into `saved`.
pub fn save_host_timers<C: Chipset>(chipset: &C, saved: &mut SavedHostState) {
    for_each_shared_timer(|unit, timer| saved.timers.set(unit, timer, chipset.timer(unit, timer)));
}

/// Writes the latches saved by [`save_host_timers`] back.
pub fn restore_host_timers<C: Chipset>(chipset: &C, saved: &SavedHostState) {
    for_each_shared_timer(|unit, timer| chipset.set_timer(unit, timer, saved.timers.get(unit, timer)));
}

/// Calls `f` for every timer the host and engine take turns on.
fn for_each_shared_timer(mut f: impl FnMut(CiaUnit, CiaTimer)) {
    for unit in CiaUnit::ALL {
        for timer in CiaTimer::ALL {
            if !is_host_reserved(unit, timer) {
                f(unit, timer);
            }
        }
    }
}
