//! Error types.

use core::fmt;

use crate::hal::HostService;
use crate::regs::{CiaTimer, CiaUnit};

/// Process exit status used when takeover cannot proceed.
pub const EXIT_FAILURE: i32 = 20;

/// Takeover could not obtain what the engine needs to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverError {
    /// A required host service is missing.
    ServiceUnavailable(HostService),
}

impl fmt::Display for TakeoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUnavailable(service) => write!(f, "can't open {service}"),
        }
    }
}

impl core::error::Error for TakeoverError {}

/// A configuration request the arbiter refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Bit number is not one of the nine DMA channels.
    InvalidDmaChannel(u8),
    /// The timer belongs to the host and is never reprogrammed.
    ReservedTimer(CiaUnit, CiaTimer),
    /// The system has already been shut down.
    NotRunning,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDmaChannel(bit) => write!(f, "DMA bit {bit} is not a channel"),
            Self::ReservedTimer(unit, timer) => write!(f, "{unit} {timer} is reserved for the host"),
            Self::NotRunning => f.write_str("system is shut down"),
        }
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            TakeoverError::ServiceUnavailable(HostService::Command).to_string(),
            "can't open command service"
        );
        assert_eq!(
            ConfigError::ReservedTimer(CiaUnit::A, CiaTimer::B).to_string(),
            "CIA-A timer B is reserved for the host"
        );
        assert_eq!(ConfigError::InvalidDmaChannel(9).to_string(), "DMA bit 9 is not a channel");
    }
}
