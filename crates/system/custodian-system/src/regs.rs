//! Register bit layouts for the custom chip and the two CIAs.
//!
//! Write registers with a `SETCLR` bit use set/clear semantics: with
//! `SETCLR` present every other one-bit is set, without it every one-bit is
//! cleared. Bits written as zero are left alone either way.

use bitflags::bitflags;

bitflags! {
    /// INTENA / INTENAR / INTREQ / INTREQR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntBits: u16 {
        /// Serial transmit buffer empty (level 1).
        const TBE = 1 << 0;
        /// Disk block finished (level 1).
        const DSKBLK = 1 << 1;
        /// Software interrupt (level 1).
        const SOFT = 1 << 2;
        /// CIA-A, keyboard and parallel port (level 2).
        const PORTS = 1 << 3;
        /// Copper (level 3).
        const COPER = 1 << 4;
        /// Start of vertical blank (level 3).
        const VERTB = 1 << 5;
        /// Blitter finished (level 3).
        const BLIT = 1 << 6;
        /// Audio channel 0 block finished (level 4).
        const AUD0 = 1 << 7;
        /// Audio channel 1 block finished (level 4).
        const AUD1 = 1 << 8;
        /// Audio channel 2 block finished (level 4).
        const AUD2 = 1 << 9;
        /// Audio channel 3 block finished (level 4).
        const AUD3 = 1 << 10;
        /// Serial receive buffer full (level 5).
        const RBF = 1 << 11;
        /// Disk sync word found (level 5).
        const DSKSYN = 1 << 12;
        /// CIA-B and expansion bus (level 6).
        const EXTER = 1 << 13;
        /// Master interrupt enable (INTENA only).
        const INTEN = 1 << 14;
        /// Set/clear control.
        const SETCLR = 1 << 15;
    }
}

impl IntBits {
    /// Every source plus the master enable, i.e. `0x7FFF`. Writing this
    /// without `SETCLR` masks or acknowledges everything.
    pub const ALL: Self = Self::from_bits_retain(0x7FFF);

    /// The interrupt sources the engine services while it owns the machine.
    pub const ENGINE_DEFAULT: Self = Self::BLIT
        .union(Self::COPER)
        .union(Self::VERTB)
        .union(Self::EXTER)
        .union(Self::PORTS)
        .union(Self::AUD0)
        .union(Self::AUD1)
        .union(Self::AUD2)
        .union(Self::AUD3);
}

bitflags! {
    /// DMACON / DMACONR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DmaBits: u16 {
        /// Audio channel 0.
        const AUD0 = 1 << 0;
        /// Audio channel 1.
        const AUD1 = 1 << 1;
        /// Audio channel 2.
        const AUD2 = 1 << 2;
        /// Audio channel 3.
        const AUD3 = 1 << 3;
        /// Floppy disk.
        const DISK = 1 << 4;
        /// Sprites.
        const SPRITE = 1 << 5;
        /// Blitter.
        const BLITTER = 1 << 6;
        /// Copper.
        const COPPER = 1 << 7;
        /// Bitplanes.
        const RASTER = 1 << 8;
        /// Master DMA enable.
        const MASTER = 1 << 9;
        /// Blitter priority over the CPU.
        const BLTHOG = 1 << 10;
        /// Blitter zero flag (DMACONR only).
        const BZERO = 1 << 13;
        /// Blitter busy flag (DMACONR only).
        const BBUSY = 1 << 14;
        /// Set/clear control.
        const SETCLR = 1 << 15;
    }
}

impl DmaBits {
    /// The nine individually switchable channels.
    pub const CHANNELS: Self = Self::from_bits_retain(0x01FF);

    /// Channels, master and blitter priority, i.e. `0x07FF`.
    pub const ALL: Self = Self::from_bits_retain(0x07FF);

    /// Channels the host needs alive even while the engine owns the
    /// machine. They are always part of what the host gets back.
    pub const HOST_CRITICAL: Self = Self::DISK.union(Self::BLITTER);

    /// Highest bit number accepted as a single DMA channel.
    pub const LAST_CHANNEL_BIT: u8 = 8;
}

bitflags! {
    /// CIA interrupt control register.
    ///
    /// Reading returns the pending sources and clears them; writing with
    /// `SETCLR` enables sources, without it disables them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CiaIcr: u8 {
        /// Timer A underflow.
        const TA = 1 << 0;
        /// Timer B underflow.
        const TB = 1 << 1;
        /// Time-of-day alarm.
        const ALRM = 1 << 2;
        /// Serial port byte complete (keyboard on CIA-A).
        const SP = 1 << 3;
        /// FLAG pin edge.
        const FLG = 1 << 4;
        /// Set/clear control on write, interrupt-requested summary on read.
        const SETCLR = 1 << 7;
    }
}

impl CiaIcr {
    /// Every source, i.e. `0x7F`.
    pub const ALL: Self = Self::from_bits_retain(0x7F);

    /// Sources the engine enables when it takes the CIAs.
    pub const ENGINE: Self = Self::SP.union(Self::TA).union(Self::TB);
}

/// Number of CIA chips.
pub const CIA_COUNT: usize = 2;

/// One of the two CIA chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiaUnit {
    /// CIA-A: keyboard, parallel port; wired to level 2 (`PORTS`).
    A = 0,
    /// CIA-B: serial control, disk; wired to level 6 (`EXTER`).
    B = 1,
}

impl CiaUnit {
    /// Both units, in index order.
    pub const ALL: [Self; CIA_COUNT] = [Self::A, Self::B];

    /// Array index of this unit.
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for CiaUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::A => f.write_str("CIA-A"),
            Self::B => f.write_str("CIA-B"),
        }
    }
}

/// One of the two interval timers of a CIA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiaTimer {
    /// Timer A.
    A = 0,
    /// Timer B.
    B = 1,
}

impl CiaTimer {
    /// Both timers, in index order.
    pub const ALL: [Self; 2] = [Self::A, Self::B];

    /// Array index of this timer.
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for CiaTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::A => f.write_str("timer A"),
            Self::B => f.write_str("timer B"),
        }
    }
}

/// Whether the host keeps exclusive use of a CIA timer.
///
/// CIA-A timer B drives the host's task switch; reprogramming it leaves the
/// host unstable after it is restored, so it is never captured, restored or
/// handed to the engine.
pub const fn is_host_reserved(unit: CiaUnit, timer: CiaTimer) -> bool {
    matches!((unit, timer), (CiaUnit::A, CiaTimer::B))
}

/// Hardware interrupt priority level, one per autovector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqLevel {
    /// Serial TX, disk block, software.
    L1 = 1,
    /// CIA-A.
    L2 = 2,
    /// Copper, vertical blank, blitter.
    L3 = 3,
    /// Audio.
    L4 = 4,
    /// Serial RX, disk sync.
    L5 = 5,
    /// CIA-B.
    L6 = 6,
    /// Non-maskable.
    L7 = 7,
}

impl IrqLevel {
    /// All levels, in vector order.
    pub const ALL: [Self; 7] = [
        Self::L1,
        Self::L2,
        Self::L3,
        Self::L4,
        Self::L5,
        Self::L6,
        Self::L7,
    ];

    /// Level for a raw number in `1..=7`.
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::L3),
            4 => Some(Self::L4),
            5 => Some(Self::L5),
            6 => Some(Self::L6),
            7 => Some(Self::L7),
            _ => None,
        }
    }

    /// Raw level number.
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Index into the block of patched vectors (`0` for level 1).
    pub const fn vector_index(self) -> usize {
        self as usize - 1
    }

    /// INTREQ sources wired to this level.
    pub const fn sources(self) -> IntBits {
        match self {
            Self::L1 => IntBits::TBE.union(IntBits::DSKBLK).union(IntBits::SOFT),
            Self::L2 => IntBits::PORTS,
            Self::L3 => IntBits::COPER.union(IntBits::VERTB).union(IntBits::BLIT),
            Self::L4 => IntBits::AUD0
                .union(IntBits::AUD1)
                .union(IntBits::AUD2)
                .union(IntBits::AUD3),
            Self::L5 => IntBits::RBF.union(IntBits::DSKSYN),
            Self::L6 => IntBits::EXTER,
            Self::L7 => IntBits::empty(),
        }
    }

    /// CIA multiplexed behind this level, if any.
    pub const fn cia(self) -> Option<CiaUnit> {
        match self {
            Self::L2 => Some(CiaUnit::A),
            Self::L6 => Some(CiaUnit::B),
            _ => None,
        }
    }
}
