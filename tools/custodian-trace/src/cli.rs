//! Command-line interface definitions for custodian-trace.

use anyhow::{Context, Result, bail};
use clap::Parser;
use custodian_system::regs::{CiaTimer, CiaUnit, IntBits, IrqLevel};

/// Runs takeover, a configuration, nested host sections and shutdown on a
/// simulated machine and prints every register write.
#[derive(Parser)]
#[command(name = "custodian-trace", version, about)]
pub struct Cli {
    /// Nesting depth of the host section between takeover and shutdown
    /// (0 skips it).
    #[arg(long, short = 'd', default_value_t = 1)]
    pub depth: u32,

    /// Engine timer request, as UNIT:TIMER:TICKS (e.g. `b:a:0x1bc0`).
    #[arg(long, value_parser = parse_timer)]
    pub timer: Vec<TimerArg>,

    /// INTENA sources the engine enables while it owns the machine
    /// (default: the engine's standard set).
    #[arg(long, value_parser = parse_int_mask)]
    pub interrupts: Option<IntBits>,

    /// Latch every engine CIA timer starts with before any `--timer`.
    #[arg(long, value_parser = parse_u16)]
    pub initial_ticks: Option<u16>,

    /// Engine DMA channel to enable, by bit number (0-8).
    #[arg(long)]
    pub dma: Vec<u8>,

    /// Interrupt to raise and service while the engine owns the machine, as
    /// LEVEL:BITS with BITS the INTREQ mask (e.g. `3:0x20`).
    #[arg(long, value_parser = parse_fire)]
    pub fire: Vec<FireArg>,

    /// Simulate a CPU whose vector base cannot be probed.
    #[arg(long)]
    pub no_vector_base: bool,

    /// Request the host before shutdown without releasing it.
    #[arg(long)]
    pub unbalanced: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// A `--timer` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerArg {
    /// CIA.
    pub unit: CiaUnit,
    /// Timer of that CIA.
    pub timer: CiaTimer,
    /// Latch value.
    pub ticks: u16,
}

/// A `--fire` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireArg {
    /// Level whose entry point is run.
    pub level: IrqLevel,
    /// INTREQ bits raised beforehand.
    pub bits: IntBits,
}

/// Parses a decimal or `0x` hexadecimal 16-bit value.
pub fn parse_u16(s: &str) -> Result<u16> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    value.with_context(|| format!("invalid number `{s}`"))
}

fn parse_unit(s: &str) -> Result<CiaUnit> {
    match s {
        "a" | "A" | "0" => Ok(CiaUnit::A),
        "b" | "B" | "1" => Ok(CiaUnit::B),
        _ => bail!("unknown CIA `{s}`, expected a or b"),
    }
}

fn parse_cia_timer(s: &str) -> Result<CiaTimer> {
    match s {
        "a" | "A" | "0" => Ok(CiaTimer::A),
        "b" | "B" | "1" => Ok(CiaTimer::B),
        _ => bail!("unknown timer `{s}`, expected a or b"),
    }
}

/// Parses `UNIT:TIMER:TICKS`.
pub fn parse_timer(s: &str) -> Result<TimerArg> {
    let mut parts = s.split(':');
    let (Some(unit), Some(timer), Some(ticks), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("expected UNIT:TIMER:TICKS, got `{s}`");
    };
    Ok(TimerArg {
        unit: parse_unit(unit)?,
        timer: parse_cia_timer(timer)?,
        ticks: parse_u16(ticks)?,
    })
}

/// Parses an INTENA source mask; the master and set/clear bits are not
/// sources.
pub fn parse_int_mask(s: &str) -> Result<IntBits> {
    let bits = IntBits::from_bits_retain(parse_u16(s)?);
    if bits.intersects(IntBits::INTEN | IntBits::SETCLR) {
        bail!("interrupt mask `{s}` includes INTEN or SETCLR");
    }
    Ok(bits)
}

/// Parses `LEVEL:BITS`.
pub fn parse_fire(s: &str) -> Result<FireArg> {
    let Some((level, bits)) = s.split_once(':') else {
        bail!("expected LEVEL:BITS, got `{s}`");
    };
    let number: u8 = level.parse().with_context(|| format!("invalid level `{level}`"))?;
    let level = IrqLevel::from_number(number).with_context(|| format!("level {number} is not 1-7"))?;
    Ok(FireArg {
        level,
        bits: IntBits::from_bits_retain(parse_u16(bits)?) & IntBits::ALL,
    })
}
