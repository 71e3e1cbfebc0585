//! The ownership arbiter.
//!
//! [`System`] moves the machine between two states:
//!
//! - **engine owns**: engine vectors, engine interrupts, engine DMA and
//!   engine CIA timers; the host is frozen.
//! - **host active**: host vectors, host interrupts and timers, and the
//!   host-critical DMA channels; the engine's display DMA keeps running.
//!
//! Callers that need the host (file access, allocation bookkeeping that
//! logs) bracket their work with [`System::acquire`] / [`System::release`],
//! or hold a [`HostSection`]. Only the outermost pair switches the machine;
//! nested pairs only count.

use core::ops::{Deref, DerefMut};

use custodian_core::{kdebug, kerr, kfatal, kinfo, kprintln, kwarn};

use crate::config::SystemConfig;
use crate::dispatch::InterruptDispatch;
use crate::dma::{self, DmaController, TimerRequests};
use crate::error::{ConfigError, EXIT_FAILURE, TakeoverError};
use crate::hal::{Chipset, HostService, HostServices, VectorBase, ViewHandle};
use crate::ownership::{Transition, UseCount};
use crate::registry::{Handler, HandlerRegistry, InterruptId};
use crate::regs::{CiaIcr, CiaTimer, CiaUnit, DmaBits, IntBits};
use crate::saved::SavedHostState;
use crate::vectors::VectorPatcher;

/// Services the engine cannot run without, in opening order.
const REQUIRED_SERVICES: [HostService; 2] = [HostService::Display, HostService::Command];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Released,
}

/// Owner of the machine's interrupt, DMA and timer state between takeover
/// and shutdown.
pub struct System<'a, C: Chipset, H: HostServices> {
    chipset: &'a C,
    host: H,
    registry: &'a HandlerRegistry,
    config: SystemConfig,
    uses: UseCount,
    saved: SavedHostState,
    dma: DmaController,
    timers: TimerRequests,
    vectors: VectorPatcher,
    host_view: Option<ViewHandle>,
    phase: Phase,
    clamps: u32,
}

impl<'a, C: Chipset, H: HostServices> System<'a, C, H> {
    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Takes the machine from the host.
    ///
    /// On success the engine owns the machine and [`uses`](Self::uses) is 0.
    ///
    /// # Errors
    ///
    /// [`TakeoverError::ServiceUnavailable`] if a required host service is
    /// missing. Services opened before the failure are closed again and the
    /// machine is untouched.
    pub fn takeover(
        chipset: &'a C,
        mut host: H,
        registry: &'a HandlerRegistry,
        config: SystemConfig,
    ) -> Result<Self, TakeoverError> {
        open_services(&mut host)?;
        Ok(Self::bootstrap(chipset, host, registry, config))
    }

    /// Like [`takeover`](Self::takeover), but a missing service terminates
    /// the process with [`EXIT_FAILURE`] after reporting it.
    pub fn takeover_or_kill(
        chipset: &'a C,
        mut host: H,
        registry: &'a HandlerRegistry,
        config: SystemConfig,
    ) -> Self {
        if let Err(err) = open_services(&mut host) {
            kprintln!("ERR: SYSKILL: '{err}'");
            kfatal!("[system] takeover failed: {err}");
            host.terminate(EXIT_FAILURE);
        }
        Self::bootstrap(chipset, host, registry, config)
    }

    fn bootstrap(chipset: &'a C, mut host: H, registry: &'a HandlerRegistry, config: SystemConfig) -> Self {
        kinfo!("[system] stack size: {} bytes", host.stack_size());

        // Blanking the view while the host blitter still runs can corrupt
        // the host copper list.
        host.own_blitter();
        host.wait_blit();

        let host_view = host.active_view();
        host.wait_top_of_frame();
        host.load_view(None);
        host.wait_top_of_frame();
        // Second field of an interlaced screen.
        host.wait_top_of_frame();

        let mut vectors = VectorPatcher::new();
        vectors.locate(&mut host);

        host.flush_io();

        let mut saved = SavedHostState::new();
        saved.intena = chipset.intenar() & IntBits::ALL;
        saved.dmacon = chipset.dmaconr() & DmaBits::ALL;
        saved.initial_dmacon = saved.dmacon;

        chipset.set_intena(IntBits::ALL);
        chipset.set_intreq(IntBits::ALL);
        chipset.wait_tick();
        chipset.set_dmacon(DmaBits::ALL);

        let timers = TimerRequests::new(config.initial_timers);
        let mut system = Self {
            chipset,
            host,
            registry,
            config,
            uses: UseCount::new(),
            saved,
            dma: DmaController::new(),
            timers,
            vectors,
            host_view,
            phase: Phase::Running,
            clamps: 0,
        };

        // The first release snapshots the host and installs the engine.
        system.uses.set(1);
        system.release();
        kinfo!("[system] engine owns the machine");
        system
    }

    /// Gives every resource back to the host as it was at takeover.
    ///
    /// An unbalanced [`acquire`](Self::acquire) count is logged and
    /// discarded so the restore still runs. Afterwards the arbiter is inert:
    /// configuration calls fail with [`ConfigError::NotRunning`] and
    /// acquire/release only log.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Released {
            kwarn!("[system] shutdown called twice");
            return;
        }
        let chip = self.chipset;

        chip.set_intena(IntBits::ALL);
        chip.set_intreq(IntBits::ALL);
        chip.wait_tick();
        chip.set_dmacon(DmaBits::ALL);
        chip.set_intreq(IntBits::ALL);

        if !self.uses.is_zero() {
            kerr!("[system] unbalanced use count at shutdown: {}", self.uses.get());
        }
        self.uses.set(0);
        self.acquire_edge();
        self.uses.set(0);
        // Critical channels the engine enabled after takeover are still on.
        chip.set_dmacon(DmaBits::ALL);
        chip.set_dmacon(DmaBits::SETCLR | DmaBits::MASTER | self.saved.initial_dmacon);

        self.host.wait_top_of_frame();
        self.host.load_view(self.host_view);
        self.host.wait_top_of_frame();

        self.host.wait_blit();
        self.host.disown_blitter();

        for service in REQUIRED_SERVICES {
            kinfo!("[system] closing {service}");
            self.host.close_service(service);
        }
        self.phase = Phase::Released;
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    /// Lets the host run. Only the outermost call restores the host.
    pub fn acquire(&mut self) {
        if self.phase == Phase::Released {
            kwarn!("[system] acquire after shutdown ignored");
            return;
        }
        if self.uses.acquire() == Transition::ToHost {
            self.acquire_edge();
        }
    }

    /// Undoes one [`acquire`](Self::acquire). The call balancing the
    /// outermost acquire gives the machine back to the engine.
    pub fn release(&mut self) {
        if self.phase == Phase::Released {
            kwarn!("[system] release after shutdown ignored");
            return;
        }
        match self.uses.release() {
            Transition::ToEngine => self.release_edge(),
            Transition::Clamped => {
                self.clamps += 1;
                kwarn!("[system] release without acquire, use count clamped to 0");
            }
            Transition::ToHost | Transition::Nested => {}
        }
    }

    /// Acquires the host for the lifetime of the returned guard.
    pub fn host_section(&mut self) -> HostSection<'_, 'a, C, H> {
        self.acquire();
        HostSection { system: self }
    }

    /// Whether the engine owns the machine.
    pub fn is_engine_owned(&self) -> bool {
        self.phase == Phase::Running && self.uses.is_zero()
    }

    /// Whether the host is running, either restored by an acquire or
    /// after shutdown.
    pub fn is_host_active(&self) -> bool {
        !self.is_engine_owned()
    }

    /// Current acquire depth.
    pub fn uses(&self) -> i32 {
        self.uses.get()
    }

    /// Number of releases that found the counter already at zero.
    pub fn clamp_count(&self) -> u32 {
        self.clamps
    }

    /// 1 to 0: snapshot the host, install the engine.
    fn release_edge(&mut self) {
        let chip = self.chipset;

        // Disk DMA only runs if the host was actually restored; flushing
        // otherwise would wait on a frozen host.
        if chip.dmaconr().contains(DmaBits::DISK) {
            self.host.flush_io();
        }

        chip.set_intena(IntBits::ALL);
        chip.set_intreq(IntBits::ALL);
        for unit in CiaUnit::ALL {
            chip.write_icr(unit, CiaIcr::ALL);
        }

        dma::save_host_timers(chip, &mut self.saved);
        self.timers.apply(chip);
        for unit in CiaUnit::ALL {
            chip.write_icr(unit, CiaIcr::SETCLR | CiaIcr::ENGINE);
        }

        // Sprite DMA must not stop mid-frame.
        chip.wait_tick();
        chip.set_dmacon(DmaBits::HOST_CRITICAL);

        chip.set_intreq(IntBits::ALL);
        self.vectors.patch_to_engine(&mut self.saved, &self.config.engine_vectors);

        self.dma.apply_engine(chip);
        chip.set_intena(IntBits::SETCLR | IntBits::INTEN | self.config.engine_interrupts);
        kdebug!("[system] engine installed");
    }

    /// 0 to 1: put the host back.
    fn acquire_edge(&mut self) {
        let chip = self.chipset;

        chip.set_intena(IntBits::ALL);
        chip.set_intreq(IntBits::ALL);
        chip.set_dmacon(DmaBits::HOST_CRITICAL);
        chip.wait_tick();

        for unit in CiaUnit::ALL {
            chip.write_icr(unit, CiaIcr::ALL);
        }

        self.vectors.restore_to_host(&self.saved);
        dma::restore_host_timers(chip, &self.saved);

        // The host keeps the CIA-B time-of-day alarm armed.
        chip.write_icr(CiaUnit::B, CiaIcr::SETCLR | CiaIcr::ALRM);

        DmaController::restore_host(chip, &self.saved);
        chip.set_intena(IntBits::SETCLR | IntBits::INTEN | self.saved.intena);
        kdebug!("[system] host restored");
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Installs or removes the engine handler for `id`.
    ///
    /// Allowed at any time, including while interrupts are live.
    pub fn set_handler(&self, id: InterruptId, handler: Option<Handler>) {
        self.registry.set_handler(id, handler);
    }

    /// Enables or disables one engine DMA channel (bits 0 through 8).
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidDmaChannel`] for other bits,
    /// [`ConfigError::NotRunning`] after shutdown.
    pub fn set_dma_channel(&mut self, bit: u8, enabled: bool) -> Result<(), ConfigError> {
        self.ensure_running()?;
        let owned = self.is_engine_owned();
        self.dma.set_channel(self.chipset, &mut self.saved, bit, enabled, owned)
    }

    /// Enables or disables a set of engine DMA channels.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotRunning`] after shutdown.
    pub fn set_dma_mask(&mut self, mask: DmaBits, enabled: bool) -> Result<(), ConfigError> {
        self.ensure_running()?;
        let owned = self.is_engine_owned();
        self.dma.set_mask(self.chipset, &mut self.saved, mask, enabled, owned);
        Ok(())
    }

    /// Sets the engine latch of a CIA timer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReservedTimer`] for CIA-A timer B,
    /// [`ConfigError::NotRunning`] after shutdown.
    pub fn set_timer(&mut self, unit: CiaUnit, timer: CiaTimer, ticks: u16) -> Result<(), ConfigError> {
        self.ensure_running()?;
        let owned = self.is_engine_owned();
        self.timers.set(self.chipset, unit, timer, ticks, owned)
    }

    fn ensure_running(&self) -> Result<(), ConfigError> {
        match self.phase {
            Phase::Running => Ok(()),
            Phase::Released => Err(ConfigError::NotRunning),
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Logs the arbiter state at debug level.
    pub fn dump(&self) {
        kdebug!("[system] use count: {}", self.uses.get());
        kdebug!(
            "[system] engine DMA {:#06x}, host DMA {:#06x}",
            self.dma.want().bits(),
            self.saved.dmacon.bits()
        );
        for (id, handler) in self.registry.registered() {
            kdebug!("[system] handler {id}: context {:p}", handler.context().as_ptr());
        }
    }

    /// Dispatcher over this system's chipset and registry.
    pub fn dispatcher(&self) -> InterruptDispatch<'a, C> {
        InterruptDispatch::new(self.chipset, self.registry)
    }

    /// What will be given back to the host.
    pub fn saved(&self) -> &SavedHostState {
        &self.saved
    }

    /// DMA channels the engine wants.
    pub fn dma_want(&self) -> DmaBits {
        self.dma.want()
    }

    /// Latch the engine wants for a CIA timer.
    pub fn timer_request(&self, unit: CiaUnit, timer: CiaTimer) -> u16 {
        self.timers.get(unit, timer)
    }

    /// Vector table found at takeover.
    pub fn vector_base(&self) -> Option<VectorBase> {
        self.vectors.base()
    }

    /// The chipset.
    pub fn chipset(&self) -> &'a C {
        self.chipset
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Consumes the arbiter and returns the host.
    pub fn into_host(self) -> H {
        self.host
    }
}

/// Opens every required service, closing the already opened ones again if
/// one is missing.
fn open_services<H: HostServices>(host: &mut H) -> Result<(), TakeoverError> {
    for (i, service) in REQUIRED_SERVICES.into_iter().enumerate() {
        if !host.open_service(service) {
            for opened in REQUIRED_SERVICES[..i].iter().rev() {
                host.close_service(*opened);
            }
            return Err(TakeoverError::ServiceUnavailable(service));
        }
        kdebug!("[system] opened {service}");
    }
    Ok(())
}

/// Keeps the host running until dropped.
///
/// Returned by [`System::host_section`]; dereferences to the system so the
/// section can still configure it.
pub struct HostSection<'s, 'a, C: Chipset, H: HostServices> {
    system: &'s mut System<'a, C, H>,
}

impl<'a, C: Chipset, H: HostServices> Deref for HostSection<'_, 'a, C, H> {
    type Target = System<'a, C, H>;

    fn deref(&self) -> &Self::Target {
        self.system
    }
}

impl<C: Chipset, H: HostServices> DerefMut for HostSection<'_, '_, C, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.system
    }
}

impl<C: Chipset, H: HostServices> Drop for HostSection<'_, '_, C, H> {
    fn drop(&mut self) {
        self.system.release();
    }
}
