//! Ambient support for the custodian hardware arbiter.
//!
//! Everything here is usable before the engine owns the machine and from
//! interrupt context: leveled logging through registered sinks, a `Sync`
//! cell for statics published to interrupt stubs, unsafe-precondition
//! checks, and a shim that swaps `core` atomics for loom's under
//! `cfg(loom)`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod cell;
pub mod log;
pub mod safety;
pub mod sync;
