//! A `Sync` wrapper around `UnsafeCell` for statics shared with interrupt
//! stubs.
//!
//! Interrupt entry points take no arguments, so whatever they operate on has
//! to live in a static. The mainline publishes it once, before the vectors
//! are patched, and the stubs only read it afterwards.

use core::cell::UnsafeCell;

/// An `UnsafeCell` that opts into `Send` and `Sync`.
///
/// # Safety
///
/// Callers synchronise every access themselves. On the single-CPU targets
/// this crate serves, that means: write only while the interrupts that read
/// the cell are masked.
#[repr(transparent)]
pub struct RacyCell<T>(UnsafeCell<T>);

// SAFETY: Synchronisation is the caller's responsibility, see the type docs.
unsafe impl<T: Send> Send for RacyCell<T> {}
// SAFETY: Same as above.
unsafe impl<T: Sync> Sync for RacyCell<T> {}

impl<T> RacyCell<T> {
    /// Wraps `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Raw pointer to the contents.
    #[inline]
    pub const fn get(&self) -> *mut T {
        self.0.get()
    }

    /// Exclusive access through an exclusive borrow.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }

    /// Overwrites the contents.
    ///
    /// # Safety
    ///
    /// No reader may run concurrently, i.e. every interrupt that reads this
    /// cell must be masked for the duration of the call.
    #[inline]
    pub unsafe fn publish(&self, value: T) {
        // SAFETY: The caller guarantees there is no concurrent reader.
        unsafe { *self.0.get() = value };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read() {
        let cell = RacyCell::new(0u32);
        // SAFETY: Single-threaded test, no concurrent reader.
        unsafe { cell.publish(7) };
        // SAFETY: As above.
        assert_eq!(unsafe { *cell.get() }, 7);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut cell = RacyCell::new([1u8, 2]);
        cell.get_mut()[1] = 9;
        // SAFETY: Single-threaded test.
        assert_eq!(unsafe { *cell.get() }, [1, 9]);
    }
}
