//! In-memory machine and host for tests and the trace tool.
//!
//! [`MockMachine`] keeps the custom-chip and CIA registers in ordinary
//! memory with the same set/clear and read-to-clear rules as the hardware,
//! and records every write as a [`MockEvent`]. [`MockHost`] owns a fake
//! exception vector table and records every host call as a [`HostCall`].

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ptr::NonNull;

use crate::hal::{Chipset, HandlerAddr, HostService, HostServices, VectorBase, ViewHandle};
use crate::regs::{CIA_COUNT, CiaIcr, CiaTimer, CiaUnit, DmaBits, IntBits};

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A register write or barrier observed by [`MockMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    /// INTENA write.
    IntEna(IntBits),
    /// INTREQ write.
    IntReq(IntBits),
    /// DMACON write.
    DmaCon(DmaBits),
    /// CIA ICR write.
    Icr(CiaUnit, CiaIcr),
    /// CIA timer latch write.
    Timer(CiaUnit, CiaTimer, u16),
    /// Wait for the vertical blank.
    TickWait,
}

#[derive(Debug, Default)]
struct MachineState {
    intena: u16,
    intreq: u16,
    dmacon: u16,
    icr_mask: [u8; CIA_COUNT],
    icr_pending: [u8; CIA_COUNT],
    timers: [[u16; 2]; CIA_COUNT],
    events: Vec<MockEvent>,
}

/// Applies a set/clear register write.
fn set_clear(reg: &mut u16, value: u16, setclr: u16) {
    if value & setclr != 0 {
        *reg |= value & !setclr;
    } else {
        *reg &= !value;
    }
}

/// Custom chip and CIAs modelled in memory.
#[derive(Debug, Default)]
pub struct MockMachine {
    state: RefCell<MachineState>,
}

impl MockMachine {
    /// Machine with every register zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Machine as a running host leaves it: the given interrupt and DMA
    /// enables, CIA-B alarm enabled, and the given host timer latches.
    pub fn with_host_state(intena: IntBits, dmacon: DmaBits, timers: [[u16; 2]; CIA_COUNT]) -> Self {
        let machine = Self::new();
        {
            let mut s = machine.state.borrow_mut();
            s.intena = intena.bits() & IntBits::ALL.bits();
            s.dmacon = dmacon.bits() & !DmaBits::SETCLR.bits();
            s.icr_mask[CiaUnit::B.index()] = CiaIcr::ALRM.bits();
            s.timers = timers;
        }
        machine
    }

    /// Latches interrupt requests, as the hardware would.
    pub fn raise(&self, bits: IntBits) {
        self.state.borrow_mut().intreq |= bits.bits() & IntBits::ALL.bits();
    }

    /// Latches CIA sources and the interrupt line the CIA is wired to.
    pub fn raise_cia(&self, unit: CiaUnit, bits: CiaIcr) {
        let mut s = self.state.borrow_mut();
        s.icr_pending[unit.index()] |= bits.bits() & CiaIcr::ALL.bits();
        s.intreq |= match unit {
            CiaUnit::A => IntBits::PORTS.bits(),
            CiaUnit::B => IntBits::EXTER.bits(),
        };
    }

    /// Current INTENA contents.
    pub fn intena(&self) -> IntBits {
        IntBits::from_bits_retain(self.state.borrow().intena)
    }

    /// Current INTREQ contents.
    pub fn intreq(&self) -> IntBits {
        IntBits::from_bits_retain(self.state.borrow().intreq)
    }

    /// Current DMACON contents.
    pub fn dmacon(&self) -> DmaBits {
        DmaBits::from_bits_retain(self.state.borrow().dmacon)
    }

    /// Enabled sources of a CIA.
    pub fn icr_mask(&self, unit: CiaUnit) -> CiaIcr {
        CiaIcr::from_bits_retain(self.state.borrow().icr_mask[unit.index()])
    }

    /// Current latch of a CIA timer.
    pub fn timer_latch(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        self.state.borrow().timers[unit.index()][timer.index()]
    }

    /// Every event recorded so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.borrow().events.clone()
    }

    /// Returns and forgets the recorded events.
    pub fn take_events(&self) -> Vec<MockEvent> {
        core::mem::take(&mut self.state.borrow_mut().events)
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: MockEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

impl Chipset for MockMachine {
    fn intenar(&self) -> IntBits {
        self.intena()
    }

    fn set_intena(&self, bits: IntBits) {
        set_clear(&mut self.state.borrow_mut().intena, bits.bits(), IntBits::SETCLR.bits());
        self.record(MockEvent::IntEna(bits));
    }

    fn intreqr(&self) -> IntBits {
        self.intreq()
    }

    fn set_intreq(&self, bits: IntBits) {
        set_clear(&mut self.state.borrow_mut().intreq, bits.bits(), IntBits::SETCLR.bits());
        self.record(MockEvent::IntReq(bits));
    }

    fn dmaconr(&self) -> DmaBits {
        self.dmacon()
    }

    fn set_dmacon(&self, bits: DmaBits) {
        set_clear(&mut self.state.borrow_mut().dmacon, bits.bits(), DmaBits::SETCLR.bits());
        self.record(MockEvent::DmaCon(bits));
    }

    fn read_icr(&self, unit: CiaUnit) -> CiaIcr {
        let pending = core::mem::take(&mut self.state.borrow_mut().icr_pending[unit.index()]);
        CiaIcr::from_bits_retain(pending)
    }

    fn write_icr(&self, unit: CiaUnit, bits: CiaIcr) {
        {
            let mut s = self.state.borrow_mut();
            let mut mask = u16::from(s.icr_mask[unit.index()]);
            set_clear(&mut mask, u16::from(bits.bits()), u16::from(CiaIcr::SETCLR.bits()));
            s.icr_mask[unit.index()] = mask.to_le_bytes()[0];
        }
        self.record(MockEvent::Icr(unit, bits));
    }

    fn timer(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        self.timer_latch(unit, timer)
    }

    fn set_timer(&self, unit: CiaUnit, timer: CiaTimer, ticks: u16) {
        self.state.borrow_mut().timers[unit.index()][timer.index()] = ticks;
        self.record(MockEvent::Timer(unit, timer, ticks));
    }

    fn wait_tick(&self) {
        // The beam always gets there.
        self.raise(IntBits::VERTB);
        self.record(MockEvent::TickWait);
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// A host call observed by [`MockHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    /// `open_service` (with the result).
    Open(HostService, bool),
    /// `close_service`.
    Close(HostService),
    /// `own_blitter`.
    OwnBlitter,
    /// `wait_blit`.
    WaitBlit,
    /// `disown_blitter`.
    DisownBlitter,
    /// `load_view`.
    LoadView(Option<ViewHandle>),
    /// `wait_top_of_frame`.
    WaitTopOfFrame,
    /// `probe_vector_base`.
    ProbeVectorBase,
    /// `flush_io`.
    FlushIo,
}

/// First host handler address placed in the fake vector table.
pub const HOST_HANDLER_BASE: usize = 0x00F8_1000;

/// View the mock host reports as active.
pub const HOST_VIEW: ViewHandle = ViewHandle(0x0002_4000);

/// Host operating system modelled in memory.
#[derive(Debug)]
pub struct MockHost {
    missing: Option<HostService>,
    table: Option<NonNull<[usize; VectorBase::SLOTS]>>,
    view: Option<ViewHandle>,
    calls: Vec<HostCall>,
}

impl MockHost {
    /// Host with every service present and a relocatable vector table whose
    /// slot `i` holds `HOST_HANDLER_BASE + 0x10 * i`.
    pub fn new() -> Self {
        let mut table = Box::new([0usize; VectorBase::SLOTS]);
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = HOST_HANDLER_BASE + 0x10 * i;
        }
        Self {
            missing: None,
            table: Some(NonNull::from(Box::leak(table))),
            view: Some(HOST_VIEW),
            calls: Vec::new(),
        }
    }

    /// Host whose CPU has no probe-able vector base.
    pub fn without_vector_base() -> Self {
        let mut host = Self::new();
        host.free_table();
        host
    }

    /// Host lacking `service`.
    pub fn missing(service: HostService) -> Self {
        let mut host = Self::new();
        host.missing = Some(service);
        host
    }

    /// Recorded calls.
    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: HostCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Reads slot `index` of the fake vector table.
    pub fn vector_slot(&self, index: usize) -> Option<HandlerAddr> {
        // SAFETY: `table` is a live leaked box until `free_table`.
        self.table.map(|t| HandlerAddr(unsafe { (*t.as_ptr())[index] }))
    }

    /// Copy of the whole fake vector table.
    pub fn vector_table(&self) -> Option<[usize; VectorBase::SLOTS]> {
        // SAFETY: As in `vector_slot`.
        self.table.map(|t| unsafe { *t.as_ptr() })
    }

    fn free_table(&mut self) {
        if let Some(t) = self.table.take() {
            // SAFETY: `t` came from `Box::leak` and is released once.
            drop(unsafe { Box::from_raw(t.as_ptr()) });
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockHost {
    fn drop(&mut self) {
        self.free_table();
    }
}

impl HostServices for MockHost {
    fn open_service(&mut self, service: HostService) -> bool {
        let ok = self.missing != Some(service);
        self.calls.push(HostCall::Open(service, ok));
        ok
    }

    fn close_service(&mut self, service: HostService) {
        self.calls.push(HostCall::Close(service));
    }

    fn stack_size(&self) -> usize {
        4096
    }

    fn own_blitter(&mut self) {
        self.calls.push(HostCall::OwnBlitter);
    }

    fn wait_blit(&mut self) {
        self.calls.push(HostCall::WaitBlit);
    }

    fn disown_blitter(&mut self) {
        self.calls.push(HostCall::DisownBlitter);
    }

    fn active_view(&self) -> Option<ViewHandle> {
        self.view
    }

    fn load_view(&mut self, view: Option<ViewHandle>) {
        self.view = view;
        self.calls.push(HostCall::LoadView(view));
    }

    fn wait_top_of_frame(&mut self) {
        self.calls.push(HostCall::WaitTopOfFrame);
    }

    fn probe_vector_base(&mut self) -> Option<VectorBase> {
        self.calls.push(HostCall::ProbeVectorBase);
        let table = self.table?;
        // SAFETY: The leaked box holds SLOTS aligned entries and lives until
        // the host is dropped, which outlives every use by the arbiter.
        unsafe { VectorBase::new(table.as_ptr().cast::<usize>()) }
    }

    fn flush_io(&mut self) {
        self.calls.push(HostCall::FlushIo);
    }

    fn terminate(&mut self, status: i32) -> ! {
        panic!("host terminated with status {status}");
    }
}
