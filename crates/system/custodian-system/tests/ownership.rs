//! End-to-end ownership scenarios against the mock machine and host.

#![cfg(not(loom))]

use custodian_system::hal::{HandlerAddr, HostService};
use custodian_system::hal::mock::{HOST_HANDLER_BASE, HOST_VIEW, HostCall, MockEvent, MockHost, MockMachine};
use custodian_system::regs::{CiaIcr, CiaTimer, CiaUnit, DmaBits, IntBits, IrqLevel};
use custodian_system::saved::TimerLatches;
use custodian_system::vectors::{FIRST_VECTOR_SLOT, VECTOR_COUNT};
use custodian_system::{
    ChipSource, ConfigError, Context, Handler, HandlerRegistry, InterruptId, System, SystemConfig,
};

const HOST_INTENA: IntBits = IntBits::INTEN.union(IntBits::VERTB).union(IntBits::PORTS).union(IntBits::EXTER);
const HOST_DMA: DmaBits = DmaBits::MASTER
    .union(DmaBits::DISK)
    .union(DmaBits::BLITTER)
    .union(DmaBits::COPPER)
    .union(DmaBits::RASTER);
const HOST_TIMERS: [[u16; 2]; 2] = [[0x1111, 0x2222], [0x3333, 0x4444]];

fn engine_vectors() -> [HandlerAddr; VECTOR_COUNT] {
    core::array::from_fn(|i| HandlerAddr(0x0004_0000 + 0x20 * i))
}

fn machine() -> MockMachine {
    MockMachine::with_host_state(HOST_INTENA, HOST_DMA, HOST_TIMERS)
}

fn takeover<'a>(m: &'a MockMachine, reg: &'a HandlerRegistry) -> System<'a, MockMachine, MockHost> {
    System::takeover(m, MockHost::new(), reg, SystemConfig::new(engine_vectors())).unwrap()
}

fn host_vector(i: usize) -> HandlerAddr {
    HandlerAddr(HOST_HANDLER_BASE + 0x10 * (FIRST_VECTOR_SLOT + i))
}

/// Each edge ends with exactly one INTENA enable write.
fn is_edge_enable(e: &MockEvent) -> bool {
    matches!(e, MockEvent::IntEna(bits) if bits.contains(IntBits::SETCLR))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn takeover_then_shutdown_restores_host() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let before = MockHost::new().vector_table();

    let mut sys = takeover(&m, &reg);
    assert!(sys.is_engine_owned());
    assert_eq!(sys.uses(), 0);
    for i in 0..VECTOR_COUNT {
        assert_eq!(sys.host().vector_slot(FIRST_VECTOR_SLOT + i), Some(engine_vectors()[i]));
    }

    sys.shutdown();

    assert!(!sys.is_engine_owned());
    assert!(sys.is_host_active());
    assert_eq!(sys.uses(), 0);
    assert_eq!(m.intena(), HOST_INTENA);
    assert_eq!(m.dmacon(), HOST_DMA);
    assert_eq!(m.icr_mask(CiaUnit::B), CiaIcr::ALRM);
    assert_eq!(m.icr_mask(CiaUnit::A), CiaIcr::empty());
    assert_eq!(sys.host().vector_table(), before);
    assert_eq!(sys.host().calls().last(), Some(&HostCall::Close(HostService::Command)));
    assert_eq!(sys.host().count(HostCall::LoadView(Some(HOST_VIEW))), 1);
    assert_eq!(sys.host().count(HostCall::DisownBlitter), 1);
}

#[test]
fn engine_timer_is_not_left_behind_at_shutdown() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);

    sys.set_timer(CiaUnit::A, CiaTimer::A, 0xFFFF).unwrap();
    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::A), 0xFFFF);

    sys.shutdown();

    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::A), 0x1111);
    assert_eq!(m.timer_latch(CiaUnit::B, CiaTimer::A), 0x3333);
    assert_eq!(m.timer_latch(CiaUnit::B, CiaTimer::B), 0x4444);
    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::B), 0x2222);
}

#[test]
fn unbalanced_acquire_is_repaired_at_shutdown() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    sys.acquire();
    sys.acquire();

    sys.shutdown();

    assert_eq!(sys.uses(), 0);
    assert_eq!(m.intena(), HOST_INTENA);
    assert_eq!(m.dmacon(), HOST_DMA);
}

#[test]
fn engine_blitter_is_not_left_on_at_shutdown() {
    let host_dma = DmaBits::MASTER | DmaBits::DISK | DmaBits::COPPER | DmaBits::RASTER;
    let m = MockMachine::with_host_state(HOST_INTENA, host_dma, HOST_TIMERS);
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);

    sys.set_dma_channel(6, true).unwrap();
    sys.set_dma_channel(6, false).unwrap();
    sys.shutdown();

    assert_eq!(m.dmacon(), host_dma);
}

#[test]
fn engine_held_critical_channel_is_dropped_at_shutdown() {
    let m = MockMachine::with_host_state(HOST_INTENA, DmaBits::MASTER | DmaBits::COPPER, HOST_TIMERS);
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    sys.set_dma_mask(DmaBits::DISK | DmaBits::BLITTER | DmaBits::SPRITE, true).unwrap();
    sys.acquire();

    sys.shutdown();

    assert_eq!(m.dmacon(), DmaBits::MASTER | DmaBits::COPPER);
    let host = sys.into_host();
    assert_eq!(host.count(HostCall::Close(HostService::Display)), 1);
    assert_eq!(host.count(HostCall::Close(HostService::Command)), 1);
}

#[test]
fn configured_interrupts_and_latches_are_installed() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let config = SystemConfig::new(engine_vectors())
        .with_interrupts(IntBits::VERTB | IntBits::BLIT)
        .with_timers(TimerLatches::splat(0x0400));
    let mut sys = System::takeover(&m, MockHost::new(), &reg, config).unwrap();

    assert_eq!(m.intena(), IntBits::INTEN | IntBits::VERTB | IntBits::BLIT);
    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::A), 0x0400);
    assert_eq!(m.timer_latch(CiaUnit::B, CiaTimer::B), 0x0400);
    // Host timer B of CIA-A is never reprogrammed.
    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::B), 0x2222);

    sys.shutdown();
    assert_eq!(m.timer_latch(CiaUnit::A, CiaTimer::A), 0x1111);
}

#[test]
#[should_panic(expected = "host terminated with status 20")]
fn missing_display_service_is_fatal() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let _ = System::takeover_or_kill(
        &m,
        MockHost::missing(HostService::Display),
        &reg,
        SystemConfig::new(engine_vectors()),
    );
}

#[test]
fn missing_vector_base_is_tolerated() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = System::takeover(
        &m,
        MockHost::without_vector_base(),
        &reg,
        SystemConfig::new(engine_vectors()),
    )
    .unwrap();
    assert!(sys.vector_base().is_none());
    assert!(sys.is_engine_owned());

    sys.acquire();
    sys.release();
    sys.shutdown();

    assert_eq!(sys.host().count(HostCall::ProbeVectorBase), 1);
    assert_eq!(m.intena(), HOST_INTENA);
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[test]
fn nested_pairs_switch_the_machine_once() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    m.take_events();

    sys.acquire();
    assert_eq!(sys.host().vector_slot(FIRST_VECTOR_SLOT), Some(host_vector(0)));
    sys.acquire();
    assert_eq!(sys.uses(), 2);
    sys.release();
    assert!(sys.is_host_active());
    sys.release();

    assert!(sys.is_engine_owned());
    assert_eq!(m.count(is_edge_enable), 2);
    assert_eq!(m.count(|e| *e == MockEvent::TickWait), 2);
    assert_eq!(
        m.count(|e| matches!(e, MockEvent::Timer(CiaUnit::B, CiaTimer::A, _))),
        2,
        "one restore and one engine program"
    );
    assert_eq!(sys.host().vector_slot(FIRST_VECTOR_SLOT), Some(engine_vectors()[0]));
}

#[test]
fn host_edge_restores_only_critical_dma() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    sys.set_dma_mask(DmaBits::RASTER | DmaBits::COPPER, true).unwrap();

    sys.acquire();

    // Engine display DMA keeps running next to the host's disk and blitter.
    assert_eq!(
        m.dmacon(),
        DmaBits::MASTER | DmaBits::DISK | DmaBits::BLITTER | DmaBits::RASTER | DmaBits::COPPER
    );
    assert_eq!(m.intena(), HOST_INTENA);
    assert_eq!(m.icr_mask(CiaUnit::B), CiaIcr::ALRM);
    sys.release();
    assert_eq!(m.dmacon(), DmaBits::MASTER | DmaBits::RASTER | DmaBits::COPPER);
}

#[test]
fn release_edge_flushes_io_only_after_host_ran() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    // One flush from the takeover bootstrap, none from its own release:
    // takeover disabled disk DMA first.
    assert_eq!(sys.host().count(HostCall::FlushIo), 1);

    sys.acquire();
    sys.release();

    assert_eq!(sys.host().count(HostCall::FlushIo), 2);
}

#[test]
fn critical_dma_disable_waits_for_release_edge() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    sys.set_dma_channel(6, true).unwrap();
    assert!(m.dmacon().contains(DmaBits::BLITTER));

    sys.acquire();
    m.take_events();
    sys.set_dma_channel(6, false).unwrap();
    assert!(m.events().is_empty());
    assert!(m.dmacon().contains(DmaBits::BLITTER));
    assert!(sys.saved().dmacon.contains(DmaBits::BLITTER));
    sys.release();

    assert!(!m.dmacon().contains(DmaBits::BLITTER));
    assert!(!sys.dma_want().contains(DmaBits::BLITTER));
}

#[test]
fn timer_set_while_host_active_lands_at_release() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    {
        let mut section = sys.host_section();
        section.set_timer(CiaUnit::B, CiaTimer::B, 0x0800).unwrap();
        assert_eq!(m.timer_latch(CiaUnit::B, CiaTimer::B), 0x4444);
    }
    assert_eq!(m.timer_latch(CiaUnit::B, CiaTimer::B), 0x0800);
    assert_eq!(sys.timer_request(CiaUnit::B, CiaTimer::B), 0x0800);
}

#[test]
fn reserved_timer_and_bad_channel_are_rejected() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let mut sys = takeover(&m, &reg);
    assert_eq!(
        sys.set_timer(CiaUnit::A, CiaTimer::B, 10),
        Err(ConfigError::ReservedTimer(CiaUnit::A, CiaTimer::B))
    );
    assert_eq!(sys.set_dma_channel(12, true), Err(ConfigError::InvalidDmaChannel(12)));
}

// ---------------------------------------------------------------------------
// Handlers through the arbiter
// ---------------------------------------------------------------------------

static VBLANKS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn count_vblank(ctx: Context) {
    // SAFETY: Registered with a context pointing at `VBLANKS`.
    let counter: &std::sync::atomic::AtomicUsize = unsafe { &*ctx.as_ptr().cast() };
    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
}

#[test]
fn registered_handler_runs_from_dispatch() {
    let m = machine();
    let reg = HandlerRegistry::new();
    let sys = takeover(&m, &reg);
    let id = InterruptId::Chip(ChipSource::Vertb);
    sys.set_handler(id, Some(Handler::new(count_vblank, Context::from_ref(&VBLANKS))));

    m.raise(IntBits::VERTB);
    let acked = sys.dispatcher().service(IrqLevel::L3);
    assert_eq!(acked, IntBits::VERTB);
    assert_eq!(VBLANKS.load(std::sync::atomic::Ordering::SeqCst), 1);

    sys.set_handler(id, None);
    m.raise(IntBits::VERTB);
    sys.dispatcher().service(IrqLevel::L3);
    assert_eq!(VBLANKS.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(!reg.is_registered(id));
}
