//! Register-write tracer for the custodian arbiter.
//!
//! Drives a [`System`] over the in-memory machine and host and prints what
//! each step wrote, so the ownership edges can be inspected without
//! hardware.

mod cli;

use std::fmt;

use anyhow::Result;
use clap::Parser;
use custodian_core::log::{self, LogLevel};
use custodian_system::hal::HandlerAddr;
use custodian_system::hal::mock::{HostCall, MockEvent, MockHost, MockMachine};
use custodian_system::regs::{CiaIcr, CiaUnit, DmaBits, IntBits};
use custodian_system::saved::TimerLatches;
use custodian_system::vectors::VECTOR_COUNT;
use custodian_system::{Context, Handler, HandlerRegistry, InterruptId, System, SystemConfig};

/// Where the simulated engine's level stubs live.
const STUB_BASE: usize = 0x0004_0000;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    install_sinks(&cli);

    let machine = MockMachine::with_host_state(
        IntBits::INTEN | IntBits::PORTS | IntBits::VERTB | IntBits::EXTER | IntBits::SOFT,
        DmaBits::MASTER | DmaBits::DISK | DmaBits::BLITTER | DmaBits::COPPER | DmaBits::RASTER | DmaBits::SPRITE,
        [[0x3781, 0x0001], [0x1BC0, 0x00FF]],
    );
    let host = if cli.no_vector_base {
        MockHost::without_vector_base()
    } else {
        MockHost::new()
    };
    let registry = HandlerRegistry::new();
    for slot in 0..InterruptId::COUNT {
        if let Some(id) = InterruptId::from_slot(slot) {
            registry.set_handler(id, Some(Handler::new(trace_handler, Context::from_ptr(slot as *mut u8))));
        }
    }

    let vectors: [HandlerAddr; VECTOR_COUNT] = std::array::from_fn(|i| HandlerAddr(STUB_BASE + 0x20 * i));
    let mut config = SystemConfig::new(vectors);
    if let Some(interrupts) = cli.interrupts {
        config = config.with_interrupts(interrupts);
    }
    if let Some(ticks) = cli.initial_ticks {
        config = config.with_timers(TimerLatches::splat(ticks));
    }
    let mut system = System::takeover(&machine, host, &registry, config)?;
    section("takeover", &machine);

    for req in &cli.timer {
        system.set_timer(req.unit, req.timer, req.ticks)?;
    }
    for bit in &cli.dma {
        system.set_dma_channel(*bit, true)?;
    }
    section("configure", &machine);

    for fire in &cli.fire {
        machine.raise(fire.bits);
        if fire.bits.contains(IntBits::PORTS) {
            machine.raise_cia(CiaUnit::A, CiaIcr::SP);
        }
        if fire.bits.contains(IntBits::EXTER) {
            machine.raise_cia(CiaUnit::B, CiaIcr::TA);
        }
        let acked = system.dispatcher().service(fire.level);
        println!("level {} acknowledged {}", fire.level.number(), Bits(acked.bits()));
    }
    if !cli.fire.is_empty() {
        section("interrupts", &machine);
    }

    for depth in 1..=cli.depth {
        system.acquire();
        section(&format!("acquire {depth}"), &machine);
    }
    let releases = if cli.unbalanced { cli.depth.saturating_sub(1) } else { cli.depth };
    for depth in (1..=releases).rev() {
        system.release();
        section(&format!("release {depth}"), &machine);
    }

    system.dump();
    system.shutdown();
    section("shutdown", &machine);

    let host = system.into_host();
    println!("== host calls");
    for call in host.calls() {
        println!("  {}", describe_call(call));
    }
    Ok(())
}

fn install_sinks(cli: &cli::Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LogLevel::Warn,
        (false, 0) => LogLevel::Info,
        (false, 1) => LogLevel::Debug,
        (false, _) => LogLevel::Trace,
    };
    log::set_max_level(level);
    // SAFETY: Both sinks only write to the standard streams, which is fine
    // from anywhere in this single-threaded tool.
    unsafe {
        log::set_print_fn(|args| print!("{args}"));
        log::set_log_fn(|level, args| eprintln!("[{}] {args}", level.name()));
    }
}

fn trace_handler(ctx: Context) {
    // The context carries the slot number.
    if let Some(id) = InterruptId::from_slot(ctx.as_ptr() as usize) {
        println!("  handler {id}");
    }
}

/// Prints and forgets the writes recorded since the last section.
fn section(name: &str, machine: &MockMachine) {
    println!("== {name}");
    for event in machine.take_events() {
        println!("  {}", describe_event(&event));
    }
}

/// Register value in the customary four-digit hex.
struct Bits(u16);

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04x}", self.0)
    }
}

fn describe_event(event: &MockEvent) -> String {
    match event {
        MockEvent::IntEna(bits) => format!("INTENA  <- {}", Bits(bits.bits())),
        MockEvent::IntReq(bits) => format!("INTREQ  <- {}", Bits(bits.bits())),
        MockEvent::DmaCon(bits) => format!("DMACON  <- {}", Bits(bits.bits())),
        MockEvent::Icr(unit, bits) => format!("{unit} ICR <- ${:02x}", bits.bits()),
        MockEvent::Timer(unit, timer, ticks) => format!("{unit} {timer} <- {}", Bits(*ticks)),
        MockEvent::TickWait => "wait for vertical blank".to_owned(),
    }
}

fn describe_call(call: &HostCall) -> String {
    match call {
        HostCall::Open(service, ok) => format!("open {service}: {}", if *ok { "ok" } else { "missing" }),
        HostCall::Close(service) => format!("close {service}"),
        HostCall::OwnBlitter => "own blitter".to_owned(),
        HostCall::WaitBlit => "wait blitter".to_owned(),
        HostCall::DisownBlitter => "disown blitter".to_owned(),
        HostCall::LoadView(Some(view)) => format!("load view {:#x}", view.0),
        HostCall::LoadView(None) => "blank view".to_owned(),
        HostCall::WaitTopOfFrame => "wait top of frame".to_owned(),
        HostCall::ProbeVectorBase => "probe vector base".to_owned(),
        HostCall::FlushIo => "flush I/O".to_owned(),
    }
}
