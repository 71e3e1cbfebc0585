//! Hardware ownership arbiter.
//!
//! A real-time engine running on top of a host operating system needs the
//! machine to itself for most of its run: its own interrupt handlers, its
//! own DMA channels, its own CIA timers. It still needs the host now and
//! then, to read a file or write a log line. [`System`] hands the hardware
//! back and forth between the two and guarantees that, at shutdown, the
//! host gets everything back as it left it.
//!
//! # Layout
//!
//! - [`regs`]: register bit layouts.
//! - [`hal`]: the [`Chipset`](hal::Chipset) and
//!   [`HostServices`](hal::HostServices) traits, with an MMIO
//!   implementation and an in-memory mock.
//! - [`registry`] and [`dispatch`]: engine interrupt handlers and the
//!   per-level service routine that runs them.
//! - [`vectors`], [`dma`], [`saved`]: the pieces the arbiter swaps at each
//!   ownership edge.
//! - [`arbiter`]: [`System`] itself.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "m68k", feature(asm_experimental_arch))]
#![warn(missing_docs)]

extern crate alloc;

pub mod arbiter;
pub mod config;
pub mod dispatch;
pub mod dma;
pub mod error;
pub mod hal;
pub mod ownership;
pub mod registry;
pub mod regs;
pub mod saved;
#[cfg(target_arch = "m68k")]
pub mod trampoline;
pub mod vectors;

pub use arbiter::{HostSection, System};
pub use config::SystemConfig;
pub use dispatch::InterruptDispatch;
pub use error::{ConfigError, TakeoverError};
pub use registry::{ChipSource, CiaSource, Context, Handler, HandlerRegistry, InterruptId};
