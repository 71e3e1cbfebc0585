//! Checks for preconditions that unsafe register and vector-table code
//! relies on.
//!
//! [`assert_unsafe_precondition!`] panics in debug builds and in release
//! builds compiled with `--cfg custodian_hardened`; otherwise the condition
//! is only type-checked. Use it where a violated condition would mean a
//! wild write into hardware or the exception table, and `debug_assert!` for
//! ordinary logic invariants.

/// Asserts a precondition of subsequent `unsafe` code.
///
/// ```ignore
/// assert_unsafe_precondition!(base.is_aligned(), "vector base must be word aligned");
/// ```
#[macro_export]
macro_rules! assert_unsafe_precondition {
    ($cond:expr $(,)?) => {
        $crate::assert_unsafe_precondition!(
            $cond,
            "unsafe precondition violated: {}",
            stringify!($cond),
        )
    };
    ($cond:expr, $($arg:tt)+) => {
        #[cfg(any(debug_assertions, custodian_hardened))]
        {
            if !$cond {
                panic!($($arg)+);
            }
        }
        #[cfg(not(any(debug_assertions, custodian_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
}
