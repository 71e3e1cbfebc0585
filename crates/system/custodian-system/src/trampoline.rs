//! Autovector entry stubs for the 68000 family.
//!
//! Each stub saves the scratch registers, calls
//! [`custodian_service_level`] with its level number and returns with
//! `rte`. The dispatcher they call is published once with
//! [`install_dispatch`] before the vectors point at the stubs.

use core::arch::global_asm;

use custodian_core::cell::RacyCell;

use crate::dispatch::InterruptDispatch;
use crate::hal::HandlerAddr;
use crate::hal::mmio::MmioChipset;
use crate::regs::IrqLevel;
use crate::vectors::VECTOR_COUNT;

static DISPATCH: RacyCell<Option<InterruptDispatch<'static, MmioChipset>>> = RacyCell::new(None);

macro_rules! level_stub {
    ($name:literal, $level:literal) => {
        concat!(
            ".globl ", $name, "\n",
            $name, ":\n",
            "    movem.l %d0-%d1/%a0-%a1, -(%sp)\n",
            "    move.l #", $level, ", -(%sp)\n",
            "    jsr custodian_service_level\n",
            "    addq.l #4, %sp\n",
            "    movem.l (%sp)+, %d0-%d1/%a0-%a1\n",
            "    rte\n",
        )
    };
}

global_asm!(
    ".text",
    level_stub!("custodian_level1", "1"),
    level_stub!("custodian_level2", "2"),
    level_stub!("custodian_level3", "3"),
    level_stub!("custodian_level4", "4"),
    level_stub!("custodian_level5", "5"),
    level_stub!("custodian_level6", "6"),
    level_stub!("custodian_level7", "7"),
);

unsafe extern "C" {
    fn custodian_level1();
    fn custodian_level2();
    fn custodian_level3();
    fn custodian_level4();
    fn custodian_level5();
    fn custodian_level6();
    fn custodian_level7();
}

/// Stub addresses, for `SystemConfig::new`.
pub fn engine_vectors() -> [HandlerAddr; VECTOR_COUNT] {
    [
        HandlerAddr(custodian_level1 as usize),
        HandlerAddr(custodian_level2 as usize),
        HandlerAddr(custodian_level3 as usize),
        HandlerAddr(custodian_level4 as usize),
        HandlerAddr(custodian_level5 as usize),
        HandlerAddr(custodian_level6 as usize),
        HandlerAddr(custodian_level7 as usize),
    ]
}

/// Publishes the dispatcher the stubs call.
///
/// # Safety
///
/// No stub may run during the call: either the vectors do not point at the
/// stubs yet, or all interrupts are masked.
pub unsafe fn install_dispatch(dispatch: InterruptDispatch<'static, MmioChipset>) {
    // SAFETY: Forwarded to the caller.
    unsafe { DISPATCH.publish(Some(dispatch)) };
}

/// Common body of the level stubs.
#[unsafe(no_mangle)]
extern "C" fn custodian_service_level(level: u32) {
    // SAFETY: The cell is only written by `install_dispatch`, whose caller
    // guarantees no stub is running.
    let dispatch = unsafe { &*DISPATCH.get() };
    let (Some(dispatch), Some(level)) = (dispatch, u8::try_from(level).ok().and_then(IrqLevel::from_number)) else {
        return;
    };
    dispatch.service(level);
}
