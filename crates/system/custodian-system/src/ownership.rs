//! The nested use counter.

/// What a counter step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 0 to 1: the host must be restored.
    ToHost,
    /// 1 to 0: the engine takes the machine back.
    ToEngine,
    /// An inner step; nothing to do.
    Nested,
    /// Release at 0; the counter stayed at 0.
    Clamped,
}

/// How many callers currently need the host running.
///
/// Zero means the engine owns the machine. Only the 0/1 boundary is an
/// edge; every other step just counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UseCount(i32);

impl UseCount {
    /// Counter at zero (engine owns the machine).
    pub const fn new() -> Self {
        Self(0)
    }

    /// Current depth.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether the engine owns the machine.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Forces the depth. Used at takeover and shutdown only.
    pub fn set(&mut self, depth: i32) {
        self.0 = depth;
    }

    /// Increments.
    pub fn acquire(&mut self) -> Transition {
        self.0 = self.0.saturating_add(1);
        if self.0 == 1 {
            Transition::ToHost
        } else {
            Transition::Nested
        }
    }

    /// Decrements, never below zero.
    pub fn release(&mut self) -> Transition {
        match self.0 {
            i32::MIN..=0 => {
                self.0 = 0;
                Transition::Clamped
            }
            1 => {
                self.0 = 0;
                Transition::ToEngine
            }
            _ => {
                self.0 -= 1;
                Transition::Nested
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_outer_pair_is_an_edge() {
        let mut c = UseCount::new();
        assert_eq!(c.acquire(), Transition::ToHost);
        assert_eq!(c.acquire(), Transition::Nested);
        assert_eq!(c.acquire(), Transition::Nested);
        assert_eq!(c.release(), Transition::Nested);
        assert_eq!(c.release(), Transition::Nested);
        assert_eq!(c.release(), Transition::ToEngine);
        assert!(c.is_zero());
    }

    #[test]
    fn release_at_zero_clamps() {
        let mut c = UseCount::new();
        assert_eq!(c.release(), Transition::Clamped);
        assert_eq!(c.get(), 0);
        assert_eq!(c.acquire(), Transition::ToHost);
    }

    #[test]
    fn negative_is_repaired() {
        let mut c = UseCount::new();
        c.set(-3);
        assert_eq!(c.release(), Transition::Clamped);
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn never_negative_for_any_sequence() {
        // Every 8-step acquire/release pattern.
        for pattern in 0u8..=255 {
            let mut c = UseCount::new();
            for step in 0..8 {
                if pattern & (1 << step) != 0 {
                    c.acquire();
                } else {
                    c.release();
                }
                assert!(c.get() >= 0, "pattern {pattern:#010b}");
            }
        }
    }
}
