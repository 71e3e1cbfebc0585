//! Atomics used by structures that interrupt handlers read.
//!
//! Code that must be model-checked imports its atomics from here instead of
//! `core::sync::atomic`, so `RUSTFLAGS="--cfg loom"` swaps in loom's types
//! without source changes.

pub mod loom_compat;
