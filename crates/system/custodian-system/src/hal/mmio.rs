//! Memory-mapped [`Chipset`] for the real machine.

use crate::hal::Chipset;
use crate::regs::{CiaIcr, CiaTimer, CiaUnit, DmaBits, IntBits};

/// Custom chip register block.
pub const CUSTOM_BASE: usize = 0x00DF_F000;
/// CIA-A register block (odd byte lane).
pub const CIA_A_BASE: usize = 0x00BF_E001;
/// CIA-B register block (even byte lane).
pub const CIA_B_BASE: usize = 0x00BF_D000;

// Custom chip word registers, byte offsets from CUSTOM_BASE.
const DMACONR: usize = 0x002;
const INTENAR: usize = 0x01C;
const INTREQR: usize = 0x01E;
const DMACON: usize = 0x096;
const INTENA: usize = 0x09A;
const INTREQ: usize = 0x09C;

// CIA byte registers are spaced 0x100 apart.
const CIA_TALO: usize = 0x400;
const CIA_TAHI: usize = 0x500;
const CIA_TBLO: usize = 0x600;
const CIA_TBHI: usize = 0x700;
const CIA_ICR: usize = 0xD00;

/// Volatile register access at fixed bus addresses.
#[derive(Debug)]
pub struct MmioChipset {
    custom: *mut u8,
    cia: [*mut u8; 2],
}

// SAFETY: The pointers name hardware registers, not memory owned by a
// thread. Concurrent access is the interrupt/mainline sharing the arbiter
// is built around.
unsafe impl Send for MmioChipset {}
// SAFETY: As above.
unsafe impl Sync for MmioChipset {}

impl MmioChipset {
    /// Chipset at the standard addresses.
    ///
    /// # Safety
    ///
    /// The custom chip and both CIAs must be mapped at [`CUSTOM_BASE`],
    /// [`CIA_A_BASE`] and [`CIA_B_BASE`], and the caller must be allowed to
    /// program them.
    pub const unsafe fn new() -> Self {
        // SAFETY: Forwarded to the caller.
        unsafe { Self::with_bases(CUSTOM_BASE, CIA_A_BASE, CIA_B_BASE) }
    }

    /// Chipset at explicit base addresses.
    ///
    /// # Safety
    ///
    /// Each base must address the corresponding register block.
    pub const unsafe fn with_bases(custom: usize, cia_a: usize, cia_b: usize) -> Self {
        Self {
            custom: custom as *mut u8,
            cia: [cia_a as *mut u8, cia_b as *mut u8],
        }
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        // SAFETY: `new` guarantees the custom block is mapped; offsets are
        // word-aligned register addresses inside it.
        unsafe { self.custom.add(offset).cast::<u16>().read_volatile() }
    }

    #[inline]
    fn write16(&self, offset: usize, value: u16) {
        // SAFETY: As in `read16`.
        unsafe { self.custom.add(offset).cast::<u16>().write_volatile(value) }
    }

    #[inline]
    fn cia_read(&self, unit: CiaUnit, offset: usize) -> u8 {
        // SAFETY: `new` guarantees both CIA blocks are mapped.
        unsafe { self.cia[unit.index()].add(offset).read_volatile() }
    }

    #[inline]
    fn cia_write(&self, unit: CiaUnit, offset: usize, value: u8) {
        // SAFETY: As in `cia_read`.
        unsafe { self.cia[unit.index()].add(offset).write_volatile(value) }
    }

    const fn timer_regs(timer: CiaTimer) -> (usize, usize) {
        match timer {
            CiaTimer::A => (CIA_TALO, CIA_TAHI),
            CiaTimer::B => (CIA_TBLO, CIA_TBHI),
        }
    }
}

impl Chipset for MmioChipset {
    fn intenar(&self) -> IntBits {
        IntBits::from_bits_retain(self.read16(INTENAR))
    }

    fn set_intena(&self, bits: IntBits) {
        self.write16(INTENA, bits.bits());
    }

    fn intreqr(&self) -> IntBits {
        IntBits::from_bits_retain(self.read16(INTREQR))
    }

    fn set_intreq(&self, bits: IntBits) {
        self.write16(INTREQ, bits.bits());
    }

    fn dmaconr(&self) -> DmaBits {
        DmaBits::from_bits_retain(self.read16(DMACONR))
    }

    fn set_dmacon(&self, bits: DmaBits) {
        self.write16(DMACON, bits.bits());
    }

    fn read_icr(&self, unit: CiaUnit) -> CiaIcr {
        CiaIcr::from_bits_retain(self.cia_read(unit, CIA_ICR))
    }

    fn write_icr(&self, unit: CiaUnit, bits: CiaIcr) {
        self.cia_write(unit, CIA_ICR, bits.bits());
    }

    fn timer(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        let (lo, hi) = Self::timer_regs(timer);
        // The counter keeps running; re-read if the high byte rolled over
        // between the two byte reads.
        loop {
            let high = self.cia_read(unit, hi);
            let low = self.cia_read(unit, lo);
            if self.cia_read(unit, hi) == high {
                return u16::from_be_bytes([high, low]);
            }
        }
    }

    fn set_timer(&self, unit: CiaUnit, timer: CiaTimer, ticks: u16) {
        let (lo, hi) = Self::timer_regs(timer);
        let [high, low] = ticks.to_be_bytes();
        // Low byte first: writing the high byte transfers the latch.
        self.cia_write(unit, lo, low);
        self.cia_write(unit, hi, high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake register space large enough for the custom block and a CIA.
    struct Space {
        custom: Vec<u16>,
        cia: [Vec<u8>; 2],
    }

    impl Space {
        fn new() -> Self {
            Self {
                custom: vec![0; 0x100],
                cia: [vec![0; 0x1000], vec![0; 0x1000]],
            }
        }

        fn chipset(&mut self) -> MmioChipset {
            // SAFETY: The vectors outlive the chipset within each test and
            // cover every offset used above.
            unsafe {
                MmioChipset::with_bases(
                    self.custom.as_mut_ptr() as usize,
                    self.cia[0].as_mut_ptr() as usize,
                    self.cia[1].as_mut_ptr() as usize,
                )
            }
        }
    }

    #[test]
    fn word_registers_hit_their_offsets() {
        let mut space = Space::new();
        let chip = space.chipset();
        chip.set_intena(IntBits::SETCLR | IntBits::VERTB);
        chip.set_dmacon(DmaBits::SETCLR | DmaBits::MASTER);
        assert_eq!(space.custom[INTENA / 2], 0x8020);
        assert_eq!(space.custom[DMACON / 2], 0x8200);
    }

    #[test]
    fn timer_latch_is_big_endian_pair() {
        let mut space = Space::new();
        let chip = space.chipset();
        chip.set_timer(CiaUnit::B, CiaTimer::B, 0x1234);
        assert_eq!(chip.timer(CiaUnit::B, CiaTimer::B), 0x1234);
        assert_eq!(space.cia[1][CIA_TBLO], 0x34);
        assert_eq!(space.cia[1][CIA_TBHI], 0x12);
        assert_eq!(space.cia[0][CIA_TBHI], 0);
    }

    #[test]
    fn icr_is_per_unit() {
        let mut space = Space::new();
        space.cia[0][CIA_ICR] = CiaIcr::SP.bits();
        let chip = space.chipset();
        assert_eq!(chip.read_icr(CiaUnit::A), CiaIcr::SP);
        assert_eq!(chip.read_icr(CiaUnit::B), CiaIcr::empty());
    }
}
