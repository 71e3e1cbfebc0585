//! Hardware-access interface.
//!
//! Everything the arbiter does to the machine goes through two traits:
//! [`Chipset`] for custom-chip and CIA registers, and [`HostServices`] for
//! the privileged operating-system calls made around the ownership
//! transitions. [`mmio::MmioChipset`] is the production register
//! implementation; [`mock`] models both sides in ordinary memory for tests
//! and the trace tool.

pub mod mmio;
pub mod mock;

use core::fmt;
use core::ptr::NonNull;

use custodian_core::assert_unsafe_precondition;

use crate::regs::{CiaIcr, CiaTimer, CiaUnit, DmaBits, IntBits};

// ---------------------------------------------------------------------------
// Chipset registers
// ---------------------------------------------------------------------------

/// Access to the interrupt, DMA and CIA registers.
///
/// Methods take `&self`: registers are shared hardware and interrupt
/// handlers touch them while the mainline holds a reference too.
pub trait Chipset {
    /// Reads INTENAR.
    fn intenar(&self) -> IntBits;
    /// Writes INTENA (set/clear semantics).
    fn set_intena(&self, bits: IntBits);
    /// Reads INTREQR.
    fn intreqr(&self) -> IntBits;
    /// Writes INTREQ (set/clear semantics; clearing acknowledges).
    fn set_intreq(&self, bits: IntBits);
    /// Reads DMACONR.
    fn dmaconr(&self) -> DmaBits;
    /// Writes DMACON (set/clear semantics).
    fn set_dmacon(&self, bits: DmaBits);

    /// Reads a CIA interrupt control register. Pending flags are cleared by
    /// the read.
    fn read_icr(&self, unit: CiaUnit) -> CiaIcr;
    /// Writes a CIA interrupt control register (set/clear semantics).
    fn write_icr(&self, unit: CiaUnit, bits: CiaIcr);
    /// Reads a CIA timer's current count.
    fn timer(&self, unit: CiaUnit, timer: CiaTimer) -> u16;
    /// Loads a CIA timer latch.
    fn set_timer(&self, unit: CiaUnit, timer: CiaTimer, ticks: u16);

    /// Blocks until the next vertical blank has been latched in INTREQR.
    ///
    /// Used before changing DMA that must not stop mid-frame (sprites,
    /// bitplanes). There is no timeout: the beam is the only wakeup.
    fn wait_tick(&self) {
        while !self.intreqr().contains(IntBits::VERTB) {
            core::hint::spin_loop();
        }
    }
}

// ---------------------------------------------------------------------------
// Host operating system
// ---------------------------------------------------------------------------

/// Host subsystems the engine cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostService {
    /// The display / graphics library (views, blitter ownership).
    Display,
    /// The command / DOS library (file system packets).
    Command,
}

impl fmt::Display for HostService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display => f.write_str("display service"),
            Self::Command => f.write_str("command service"),
        }
    }
}

/// Opaque handle for the view the host was displaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewHandle(pub usize);

/// Calls into the host operating system made around ownership changes.
pub trait HostServices {
    /// Opens a required host service. Returns `false` if it is missing.
    fn open_service(&mut self, service: HostService) -> bool;
    /// Closes a service opened with [`open_service`](Self::open_service).
    fn close_service(&mut self, service: HostService);

    /// Size of the current process stack, for the startup log.
    fn stack_size(&self) -> usize;

    /// Takes the blitter away from the host.
    fn own_blitter(&mut self);
    /// Waits until the blitter is idle.
    fn wait_blit(&mut self);
    /// Returns the blitter to the host.
    fn disown_blitter(&mut self);

    /// View the host is currently displaying.
    fn active_view(&self) -> Option<ViewHandle>;
    /// Displays `view`, or blanks the display with `None`.
    fn load_view(&mut self, view: Option<ViewHandle>);
    /// Waits for the top of the next frame.
    fn wait_top_of_frame(&mut self);

    /// Runs the privileged probe that finds the CPU's exception vector
    /// table. `None` when the CPU has no relocatable vector base or the
    /// probe could not be run.
    fn probe_vector_base(&mut self) -> Option<VectorBase>;

    /// Flushes pending file system writes so the disk is idle.
    fn flush_io(&mut self);

    /// Terminates the process with `status`.
    fn terminate(&mut self, status: i32) -> !;
}

// ---------------------------------------------------------------------------
// Vector table
// ---------------------------------------------------------------------------

/// Address of an interrupt handler as stored in a vector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct HandlerAddr(pub usize);

impl HandlerAddr {
    /// The empty slot value.
    pub const NULL: Self = Self(0);
}

impl fmt::Display for HandlerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Base of the CPU exception vector table.
///
/// Construction is the only unsafe step; slot reads and writes afterwards
/// are volatile and safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorBase(NonNull<usize>);

impl VectorBase {
    /// Number of slots addressable through a `VectorBase` (the 68k table).
    pub const SLOTS: usize = 256;

    /// Wraps a vector table pointer. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must point to [`SLOTS`](Self::SLOTS) writable, word-aligned
    /// entries that stay valid for as long as the handle is used.
    pub unsafe fn new(ptr: *mut usize) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        assert_unsafe_precondition!(
            ptr.as_ptr().is_aligned(),
            "vector base {:p} is not word aligned",
            ptr
        );
        Some(Self(ptr))
    }

    /// Raw base pointer.
    pub fn as_ptr(self) -> *mut usize {
        self.0.as_ptr()
    }

    /// Reads slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SLOTS`.
    pub fn read_slot(self, index: usize) -> HandlerAddr {
        assert!(index < Self::SLOTS, "vector slot {index} out of range");
        // SAFETY: `new` guarantees SLOTS valid entries; index is in range.
        HandlerAddr(unsafe { self.0.as_ptr().add(index).read_volatile() })
    }

    /// Writes slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SLOTS`.
    pub fn write_slot(self, index: usize, handler: HandlerAddr) {
        assert!(index < Self::SLOTS, "vector slot {index} out of range");
        // SAFETY: As in `read_slot`.
        unsafe { self.0.as_ptr().add(index).write_volatile(handler.0) };
    }
}
