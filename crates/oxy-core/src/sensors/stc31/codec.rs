//! STC31 frame construction and validation
//!
//! Commands are big-endian 16-bit opcodes. Commands carrying an argument
//! append one big-endian 16-bit word followed by its CRC-8. Responses are
//! sequences of `[msb, lsb, crc]` words.

use serde::{Deserialize, Serialize};

use super::SENSOR;
use crate::checksum::checksum;
use crate::error::SensorError;

/// Bytes per checked response word.
pub const WORD_LEN: usize = 3;

/// Raw value at 0 vol%.
pub const GAS_OFFSET: f32 = 16384.0;
/// Raw ticks per 100 vol%.
pub const GAS_SCALE: f32 = 32768.0;

/// STC31 opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    DisableCrc = 0x3768,
    SetBinaryGas = 0x3615,
    SetRelativeHumidity = 0x3624,
    SetTemperature = 0x361E,
    SetPressure = 0x362F,
    MeasureGasConcentration = 0x3639,
    ForcedRecalibration = 0x3661,
    EnableAsc = 0x3FEF,
    DisableAsc = 0x3F6E,
    PrepareReadAscState = 0x3752,
    /// Read or write the ASC state, depending on the transfer direction.
    AscState = 0xE133,
    ApplyAscState = 0x3650,
    SelfTest = 0x365B,
    SoftReset = 0x0006,
    EnterSleepMode = 0x3677,
    ReadProductIdentifier1 = 0x367C,
    ReadProductIdentifier2 = 0xE102,
}

impl Command {
    #[inline]
    pub const fn opcode(self) -> u16 {
        self as u16
    }
}

/// Binary gas pair and full-scale range selected at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BinaryGas {
    Co2InN2100 = 0x0000,
    Co2InAir100 = 0x0001,
    Co2InN225 = 0x0002,
    Co2InAir25 = 0x0003,
}

/// Bare command frame.
pub fn build_command(command: Command) -> [u8; 2] {
    command.opcode().to_be_bytes()
}

/// Command frame with one argument word and the argument's CRC.
pub fn build_command_with_arg(command: Command, argument: u16) -> [u8; 5] {
    let [op_hi, op_lo] = command.opcode().to_be_bytes();
    let arg = argument.to_be_bytes();
    [op_hi, op_lo, arg[0], arg[1], checksum(&arg)]
}

/// Check one `[msb, lsb, crc]` word and return its value.
pub fn validate_response(frame: &[u8]) -> Result<u16, SensorError> {
    let &[msb, lsb, received] = frame else {
        return Err(SensorError::FrameLength {
            sensor: SENSOR,
            expected: WORD_LEN,
            actual: frame.len(),
        });
    };

    let computed = checksum(&[msb, lsb]);
    if computed != received {
        return Err(SensorError::Checksum {
            sensor: SENSOR,
            computed,
            received,
        });
    }

    Ok(u16::from_be_bytes([msb, lsb]))
}

/// Validate the two words of the product-identifier response and assemble
/// the 32-bit product number.
pub fn parse_product_id(frame: &[u8]) -> Result<u32, SensorError> {
    if frame.len() != 2 * WORD_LEN {
        return Err(SensorError::FrameLength {
            sensor: SENSOR,
            expected: 2 * WORD_LEN,
            actual: frame.len(),
        });
    }

    let high = validate_response(&frame[..WORD_LEN])?;
    let low = validate_response(&frame[WORD_LEN..])?;

    Ok((u32::from(high) << 16) | u32::from(low))
}

/// Convert raw gas ticks to vol%, clamped at 0.
pub fn to_percentage(raw: u16) -> f32 {
    let concentration = ((f32::from(raw) - GAS_OFFSET) * 100.0) / GAS_SCALE;
    concentration.max(0.0)
}

/// Highest concentration the binary-gas range can encode.
pub const MAX_CONCENTRATION_PERCENT: u16 = 100;

/// Raw ticks encoding `percent` vol%, as used by forced recalibration.
///
/// Values above 100 vol% saturate at full scale.
pub const fn concentration_arg(percent: u16) -> u16 {
    let percent = if percent > MAX_CONCENTRATION_PERCENT {
        MAX_CONCENTRATION_PERCENT
    } else {
        percent
    };
    ((percent as u32 * 32768) / 100 + 16384) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        assert_eq!(build_command(Command::MeasureGasConcentration), [0x36, 0x39]);
        assert_eq!(build_command(Command::SoftReset), [0x00, 0x06]);
    }

    #[test]
    fn test_build_command_with_arg() {
        assert_eq!(
            build_command_with_arg(Command::SetBinaryGas, BinaryGas::Co2InAir100 as u16),
            [0x36, 0x15, 0x00, 0x01, 0xB0]
        );
        assert_eq!(
            build_command_with_arg(Command::ForcedRecalibration, 0xBEEF),
            [0x36, 0x61, 0xBE, 0xEF, 0x92],
            "checksum covers the argument bytes only"
        );
    }

    #[test]
    fn test_validate_response() {
        assert_eq!(validate_response(&[0xBE, 0xEF, 0x92]), Ok(0xBEEF));
        assert_eq!(
            validate_response(&[0xBE, 0xEF, 0x00]),
            Err(SensorError::Checksum {
                sensor: SENSOR,
                computed: 0x92,
                received: 0x00,
            })
        );
    }

    #[test]
    fn test_validate_response_accepts_only_matching_crc() {
        for msb in (0u8..=255).step_by(17) {
            for lsb in (0u8..=255).step_by(13) {
                let good = checksum(&[msb, lsb]);
                for crc in 0u8..=255 {
                    let result = validate_response(&[msb, lsb, crc]);
                    assert_eq!(result.is_ok(), crc == good, "{msb:#x} {lsb:#x} {crc:#x}");
                }
            }
        }
    }

    #[test]
    fn test_validate_response_length() {
        assert!(matches!(
            validate_response(&[0xBE, 0xEF]),
            Err(SensorError::FrameLength { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_parse_product_id() {
        let frame = [0x08, 0x01, 0x87, 0x03, 0x01, 0x9D];
        assert_eq!(parse_product_id(&frame), Ok(0x0801_0301));

        let corrupt = [0x08, 0x01, 0x87, 0x03, 0x01, 0x00];
        assert!(matches!(
            parse_product_id(&corrupt),
            Err(SensorError::Checksum { .. })
        ));
    }

    #[test]
    fn test_to_percentage() {
        assert_eq!(to_percentage(16384), 0.0);
        assert_eq!(to_percentage(49152), 100.0);
        assert_eq!(to_percentage(32768), 50.0);
        assert_eq!(to_percentage(0), 0.0, "below offset clamps to zero");
        assert_eq!(to_percentage(16383), 0.0);
    }

    #[test]
    fn test_concentration_arg() {
        assert_eq!(concentration_arg(0), 16384);
        assert_eq!(concentration_arg(100), 49152);
        assert_eq!(concentration_arg(25), 24576);
    }

    #[test]
    fn test_concentration_arg_saturates() {
        assert_eq!(concentration_arg(101), 49152, "just above full scale");
        assert_eq!(concentration_arg(150), 49152, "would wrap without saturation");
        assert_eq!(concentration_arg(u16::MAX), 49152);
    }
}
