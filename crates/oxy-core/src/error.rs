//! Error types shared by the sensor drivers and measurement engines

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

use crate::sensors::LedChannel;

/// Errors produced by the sensor drivers and the measurement engines.
///
/// Every variant carries the name of the sensor it came from so a log line
/// is enough to tell which chip misbehaved.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// An I2C transaction failed.
    #[error("{sensor}: I2C transaction failed during {operation} ({kind:?})")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
        kind: ErrorKind,
    },
    /// A frame had the wrong length for the operation.
    #[error("{sensor}: malformed frame, expected {expected} bytes but got {actual}")]
    FrameLength {
        sensor: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The chip answered with an unexpected part identifier.
    #[error("{sensor}: got part id {found:#x}, expected {expected:#x}")]
    PartIdMismatch {
        sensor: &'static str,
        expected: u32,
        found: u32,
    },
    /// The integrity byte of a response did not match its payload.
    #[error("{sensor}: checksum mismatch, computed {computed:#04x} but received {received:#04x}")]
    Checksum {
        sensor: &'static str,
        computed: u8,
        received: u8,
    },
    /// A read was requested for an LED channel with no FIFO slot.
    #[error("{sensor}: {channel:?} channel is inactive")]
    ChannelInactive {
        sensor: &'static str,
        channel: LedChannel,
    },
    /// The soft reset bit never cleared.
    #[error("{sensor}: reset did not complete")]
    ResetTimeout { sensor: &'static str },
    /// A start was requested while a measurement was already in flight.
    #[error("{sensor}: measurement already in progress")]
    StateConflict { sensor: &'static str },
    /// The sensor failed initialization and is not used any more.
    #[error("{sensor}: sensor is not ready")]
    NotReady { sensor: &'static str },
}

impl SensorError {
    /// Build a bus error from any `embedded-hal` I2C error.
    pub fn bus<E: embedded_hal::i2c::Error>(
        sensor: &'static str,
        operation: &'static str,
        error: E,
    ) -> Self {
        Self::Bus {
            sensor,
            operation,
            kind: error.kind(),
        }
    }

    /// True for malformed frames and identity mismatches.
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::FrameLength { .. } | Self::PartIdMismatch { .. })
    }

    /// Name of the sensor the error came from.
    pub const fn sensor(&self) -> &'static str {
        match self {
            Self::Bus { sensor, .. }
            | Self::FrameLength { sensor, .. }
            | Self::PartIdMismatch { sensor, .. }
            | Self::Checksum { sensor, .. }
            | Self::ChannelInactive { sensor, .. }
            | Self::ResetTimeout { sensor }
            | Self::StateConflict { sensor }
            | Self::NotReady { sensor } => sensor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        let length = SensorError::FrameLength {
            sensor: "MAX30102",
            expected: 6,
            actual: 5,
        };
        let checksum = SensorError::Checksum {
            sensor: "STC31",
            computed: 0x92,
            received: 0x00,
        };

        assert!(length.is_protocol());
        assert!(!checksum.is_protocol());
        assert_eq!(checksum.sensor(), "STC31");
    }

    #[test]
    fn test_bus_error_keeps_kind() {
        let error = SensorError::bus("STC31", "measure", ErrorKind::ArbitrationLoss);
        assert_eq!(
            error,
            SensorError::Bus {
                sensor: "STC31",
                operation: "measure",
                kind: ErrorKind::ArbitrationLoss,
            }
        );
    }
}
