//! Patching of the level 1..7 autovectors.

use custodian_core::{kdebug, kwarn};

use crate::hal::{HandlerAddr, HostServices, VectorBase};
use crate::saved::SavedHostState;

/// Vector table slot of the level 1 autovector (byte offset `0x64`).
pub const FIRST_VECTOR_SLOT: usize = 0x64 / 4;

/// Number of autovectors, levels 1 through 7.
pub const VECTOR_COUNT: usize = 7;

/// Finds the vector table once and swaps the autovector block between host
/// and engine handlers.
///
/// A machine without a discoverable vector base keeps working: both swaps
/// become logged no-ops and the host's handlers stay installed.
#[derive(Debug, Default)]
pub struct VectorPatcher {
    base: Option<VectorBase>,
    located: bool,
}

impl VectorPatcher {
    /// Patcher that has not probed yet.
    pub const fn new() -> Self {
        Self {
            base: None,
            located: false,
        }
    }

    /// Probes the host for the vector base. Only the first call probes;
    /// later calls return the cached result.
    pub fn locate<H: HostServices>(&mut self, host: &mut H) -> Option<VectorBase> {
        if !self.located {
            self.base = host.probe_vector_base();
            self.located = true;
            match self.base {
                Some(base) => kdebug!("vectors: table at {:p}", base.as_ptr()),
                None => kwarn!("vectors: no vector base, interrupts stay with the host"),
            }
        }
        self.base
    }

    /// Cached vector base, if [`locate`](Self::locate) found one.
    pub fn base(&self) -> Option<VectorBase> {
        self.base
    }

    /// Saves the host's autovectors into `saved` and installs `engine`.
    pub fn patch_to_engine(&self, saved: &mut SavedHostState, engine: &[HandlerAddr; VECTOR_COUNT]) {
        let Some(base) = self.base else {
            kwarn!("vectors: patch skipped, no vector base");
            return;
        };
        for (i, (host, new)) in saved.vectors.iter_mut().zip(engine).enumerate() {
            *host = base.read_slot(FIRST_VECTOR_SLOT + i);
            base.write_slot(FIRST_VECTOR_SLOT + i, *new);
        }
    }

    /// Writes the handlers saved by the last
    /// [`patch_to_engine`](Self::patch_to_engine) back.
    pub fn restore_to_host(&self, saved: &SavedHostState) {
        let Some(base) = self.base else {
            kwarn!("vectors: restore skipped, no vector base");
            return;
        };
        for (i, host) in saved.vectors.iter().enumerate() {
            base.write_slot(FIRST_VECTOR_SLOT + i, *host);
        }
    }
}
