//! `core` atomics normally, loom atomics under `cfg(loom)`.
//!
//! Loom atomics have no `const fn new`, so types built on this shim provide
//! a `const` constructor only outside of loom.

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicPtr, Ordering};
