//! Interrupt dispatch.
//!
//! One entry point per hardware level. Each call reads INTREQR once, runs
//! the registered handlers of the level's pending sources and acknowledges
//! those sources. Levels 2 and 6 additionally read the ICR of the CIA wired
//! to them and run one handler per pending CIA source.
//!
//! Dispatch runs in interrupt context: it never blocks, never allocates
//! and never calls into the arbiter.

use crate::hal::Chipset;
use crate::regs::{IntBits, IrqLevel};
use crate::registry::{ChipSource, CiaSource, HandlerRegistry, InterruptId};

/// Per-level interrupt service over a chipset and a handler registry.
pub struct InterruptDispatch<'a, C: Chipset> {
    chipset: &'a C,
    registry: &'a HandlerRegistry,
    vblank_hook: Option<fn()>,
}

impl<'a, C: Chipset> InterruptDispatch<'a, C> {
    /// Dispatcher without a vertical-blank hook.
    pub const fn new(chipset: &'a C, registry: &'a HandlerRegistry) -> Self {
        Self {
            chipset,
            registry,
            vblank_hook: None,
        }
    }

    /// Runs `hook` on every vertical blank, before the `VERTB` handler.
    ///
    /// This is where the engine keeps its frame clock; it is not a handler
    /// slot, so subsystems registering for `VERTB` cannot displace it.
    #[must_use]
    pub const fn with_vblank_hook(mut self, hook: fn()) -> Self {
        self.vblank_hook = Some(hook);
        self
    }

    /// Services one interrupt level. Returns the INTREQ bits acknowledged.
    ///
    /// Only pending sources of `level` are acknowledged, whether or not a
    /// handler was registered for them; requests of other levels are left
    /// for their own entry points.
    pub fn service(&self, level: IrqLevel) -> IntBits {
        let sources = level.sources();
        if sources.is_empty() {
            return IntBits::empty();
        }

        let pending = self.chipset.intreqr() & sources;
        if pending.is_empty() {
            return pending;
        }

        match level.cia() {
            Some(unit) => {
                let icr = self.chipset.read_icr(unit);
                for source in CiaSource::ALL {
                    if icr.contains(source.bit()) {
                        self.registry.invoke(InterruptId::Cia(unit, source));
                    }
                }
                // Expansion devices share the line with the CIA.
                for source in ChipSource::ALL {
                    if pending.contains(source.bit()) {
                        self.registry.invoke(InterruptId::Chip(source));
                    }
                }
            }
            None => {
                for source in ChipSource::ALL {
                    if !pending.contains(source.bit()) {
                        continue;
                    }
                    if let (ChipSource::Vertb, Some(hook)) = (source, self.vblank_hook) {
                        hook();
                    }
                    self.registry.invoke(InterruptId::Chip(source));
                }
            }
        }

        // A single acknowledge can be lost on fast CPUs before the request
        // line drops, so the clear is written twice.
        self.chipset.set_intreq(pending);
        self.chipset.set_intreq(pending);
        pending
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::hal::mock::{MockEvent, MockMachine};
    use crate::regs::{CiaIcr, CiaUnit};
    use crate::registry::{Context, Handler};
    use std::sync::Mutex;

    static CALLS: Mutex<Vec<(&'static str, usize)>> = Mutex::new(Vec::new());
    static LOCK: Mutex<()> = Mutex::new(());

    fn record(name: &'static str, ctx: Context) {
        CALLS.lock().unwrap().push((name, ctx.as_ptr() as usize));
    }

    fn on_vertb(ctx: Context) {
        record("vertb", ctx);
    }

    fn on_coper(ctx: Context) {
        record("coper", ctx);
    }

    fn on_blit(ctx: Context) {
        record("blit", ctx);
    }

    fn on_keyboard(ctx: Context) {
        record("keyboard", ctx);
    }

    fn on_cia_b_timer(ctx: Context) {
        record("cia-b timer", ctx);
    }

    fn tick() {
        CALLS.lock().unwrap().push(("tick", 0));
    }

    fn ctx(n: usize) -> Context {
        Context::from_ptr(n as *mut u8)
    }

    /// Runs `f` with an empty call log; tests share the static log.
    fn with_calls(f: impl FnOnce()) -> Vec<(&'static str, usize)> {
        let _guard = LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        CALLS.lock().unwrap().clear();
        f();
        core::mem::take(&mut *CALLS.lock().unwrap())
    }

    fn acks(machine: &MockMachine) -> Vec<IntBits> {
        machine
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::IntReq(bits) => Some(bits),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Chip levels
    // -----------------------------------------------------------------------

    #[test]
    fn level3_runs_each_source_with_its_own_context() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        reg.set_handler(InterruptId::Chip(ChipSource::Coper), Some(Handler::new(on_coper, ctx(0xC0))));
        reg.set_handler(InterruptId::Chip(ChipSource::Vertb), Some(Handler::new(on_vertb, ctx(0x5B))));
        reg.set_handler(InterruptId::Chip(ChipSource::Blit), Some(Handler::new(on_blit, ctx(0xB1))));
        machine.raise(IntBits::COPER | IntBits::VERTB | IntBits::BLIT);

        let calls = with_calls(|| {
            let acked = InterruptDispatch::new(&machine, &reg).service(IrqLevel::L3);
            assert_eq!(acked, IntBits::COPER | IntBits::VERTB | IntBits::BLIT);
        });

        assert_eq!(calls, [("coper", 0xC0), ("vertb", 0x5B), ("blit", 0xB1)]);
        assert!(machine.intreq().is_empty());
    }

    #[test]
    fn acknowledge_is_written_twice() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        machine.raise(IntBits::VERTB);

        InterruptDispatch::new(&machine, &reg).service(IrqLevel::L3);

        assert_eq!(acks(&machine), [IntBits::VERTB, IntBits::VERTB]);
    }

    #[test]
    fn other_levels_requests_are_left_pending() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        machine.raise(IntBits::VERTB | IntBits::AUD0 | IntBits::RBF);

        let acked = InterruptDispatch::new(&machine, &reg).service(IrqLevel::L3);

        assert_eq!(acked, IntBits::VERTB);
        assert_eq!(machine.intreq(), IntBits::AUD0 | IntBits::RBF);
    }

    #[test]
    fn nothing_pending_writes_nothing() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        machine.raise(IntBits::AUD1);

        let acked = InterruptDispatch::new(&machine, &reg).service(IrqLevel::L3);

        assert!(acked.is_empty());
        assert!(machine.events().is_empty());
    }

    #[test]
    fn unregistered_source_is_acknowledged_silently() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        machine.raise(IntBits::AUD2);

        let calls = with_calls(|| {
            InterruptDispatch::new(&machine, &reg).service(IrqLevel::L4);
        });

        assert!(calls.is_empty());
        assert_eq!(acks(&machine), [IntBits::AUD2, IntBits::AUD2]);
    }

    #[test]
    fn vblank_hook_runs_before_vertb_handler() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        reg.set_handler(InterruptId::Chip(ChipSource::Vertb), Some(Handler::new(on_vertb, ctx(1))));
        machine.raise(IntBits::VERTB);

        let calls = with_calls(|| {
            InterruptDispatch::new(&machine, &reg)
                .with_vblank_hook(tick)
                .service(IrqLevel::L3);
        });

        assert_eq!(calls, [("tick", 0), ("vertb", 1)]);
    }

    #[test]
    fn nmi_is_ignored() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        machine.raise(IntBits::ALL);

        assert!(InterruptDispatch::new(&machine, &reg).service(IrqLevel::L7).is_empty());
        assert!(machine.events().is_empty());
    }

    // -----------------------------------------------------------------------
    // CIA levels
    // -----------------------------------------------------------------------

    #[test]
    fn level2_demultiplexes_cia_a() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        reg.set_handler(
            InterruptId::Cia(CiaUnit::A, CiaSource::Serial),
            Some(Handler::new(on_keyboard, ctx(0x4B))),
        );
        machine.raise_cia(CiaUnit::A, CiaIcr::SP | CiaIcr::TA);

        let calls = with_calls(|| {
            let acked = InterruptDispatch::new(&machine, &reg).service(IrqLevel::L2);
            assert_eq!(acked, IntBits::PORTS);
        });

        assert_eq!(calls, [("keyboard", 0x4B)]);
        // The ICR read consumed both CIA flags.
        assert!(machine.read_icr(CiaUnit::A).is_empty());
        assert!(machine.intreq().is_empty());
    }

    #[test]
    fn level6_reads_cia_b_only() {
        let machine = MockMachine::new();
        let reg = HandlerRegistry::new();
        reg.set_handler(
            InterruptId::Cia(CiaUnit::B, CiaSource::TimerA),
            Some(Handler::new(on_cia_b_timer, ctx(0x7A))),
        );
        reg.set_handler(
            InterruptId::Cia(CiaUnit::A, CiaSource::TimerA),
            Some(Handler::new(on_keyboard, ctx(0))),
        );
        machine.raise_cia(CiaUnit::A, CiaIcr::TA);
        machine.raise_cia(CiaUnit::B, CiaIcr::TA);

        let calls = with_calls(|| {
            InterruptDispatch::new(&machine, &reg).service(IrqLevel::L6);
        });

        assert_eq!(calls, [("cia-b timer", 0x7A)]);
        assert_eq!(machine.intreq(), IntBits::PORTS);
        assert_eq!(machine.read_icr(CiaUnit::A), CiaIcr::TA);
    }
}
