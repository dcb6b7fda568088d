//! MAX30102 FIFO decoding and LED channel mapping
//!
//! Each active FIFO slot contributes 3 bytes per sample, MSB first, of which
//! only the low 18 bits are significant.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::SENSOR;
use crate::error::SensorError;
use crate::sensors::LedChannel;

pub const BYTES_PER_CHANNEL: usize = 3;
/// The device can drive at most two LED channels at once.
pub const MAX_NUM_CHANNELS: usize = 2;
pub const MAX_BYTES_PER_SAMPLE: usize = MAX_NUM_CHANNELS * BYTES_PER_CHANNEL;
pub const NUM_SLOTS: usize = 4;

pub const FIFO_DATA_BITS: u32 = 18;
pub const FIFO_DATA_MASK: u32 = (1 << FIFO_DATA_BITS) - 1;

/// Low two bits of a slot entry select the LED.
pub const SLOT_LED_MASK: u8 = 0x03;

/// LED selector of a multi-LED time slot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Slot {
    #[default]
    Disabled = 0,
    Red = 1,
    Infrared = 2,
}

impl Slot {
    /// LED channel selected by this slot, if any.
    pub const fn led(self) -> Option<LedChannel> {
        match self {
            Self::Disabled => None,
            Self::Red => Some(LedChannel::Red),
            Self::Infrared => Some(LedChannel::Infrared),
        }
    }

    /// Decode the selector bits of a raw slot register nibble.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & SLOT_LED_MASK {
            1 => Self::Red,
            2 => Self::Infrared,
            _ => Self::Disabled,
        }
    }
}

/// Decoded FIFO values of one sample, in FIFO slot order.
pub type FifoValues = Vec<u32, MAX_NUM_CHANNELS>;

/// Decode one FIFO sample of `active_channels` channels.
///
/// `bytes` must hold exactly `active_channels * 3` bytes.
pub fn decode_fifo(bytes: &[u8], active_channels: usize) -> Result<FifoValues, SensorError> {
    let expected = active_channels * BYTES_PER_CHANNEL;
    if active_channels > MAX_NUM_CHANNELS || bytes.len() != expected {
        return Err(SensorError::FrameLength {
            sensor: SENSOR,
            expected,
            actual: bytes.len(),
        });
    }

    let mut values = FifoValues::new();
    for chunk in bytes.chunks_exact(BYTES_PER_CHANNEL) {
        let raw = (u32::from(chunk[0]) << 16) | (u32::from(chunk[1]) << 8) | u32::from(chunk[2]);
        // Capacity was checked against MAX_NUM_CHANNELS above
        let _ = values.push(raw & FIFO_DATA_MASK);
    }

    Ok(values)
}

/// Translation from logical LED channel to FIFO position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap {
    /// FIFO position per LED channel, `None` when the channel is inactive.
    fifo_index: [Option<u8>; MAX_NUM_CHANNELS],
    active: u8,
}

impl ChannelMap {
    /// Build the map from the four slot selectors.
    ///
    /// The FIFO packs enabled slots without gaps, so an LED's position is
    /// the number of enabled slots before the first slot selecting it. The
    /// active count is the number of enabled slots, capped at the device
    /// limit of two.
    pub fn build(slots: &[Slot; NUM_SLOTS]) -> Self {
        let mut fifo_index = [None; MAX_NUM_CHANNELS];
        let mut active = 0u8;

        for (position, slot) in slots.iter().enumerate() {
            let Some(led) = slot.led() else {
                continue;
            };
            if usize::from(active) >= MAX_NUM_CHANNELS {
                log::warn!("{}: slot {} ignored, two channels already active", SENSOR, position);
                continue;
            }
            if fifo_index[led.index()].is_none() {
                fifo_index[led.index()] = Some(active);
            }
            active += 1;
        }

        Self { fifo_index, active }
    }

    /// Number of FIFO channels per sample.
    #[inline]
    pub const fn active_channels(&self) -> usize {
        self.active as usize
    }

    /// FIFO position of `channel`, `None` when it has no slot.
    #[inline]
    pub fn fifo_index(&self, channel: LedChannel) -> Option<usize> {
        self.fifo_index[channel.index()].map(usize::from)
    }

    /// Pick the value of `channel` out of a decoded sample.
    pub fn read_channel(&self, values: &[u32], channel: LedChannel) -> Result<u32, SensorError> {
        let inactive = SensorError::ChannelInactive {
            sensor: SENSOR,
            channel,
        };
        let index = self.fifo_index(channel).ok_or(inactive)?;
        values.get(index).copied().ok_or(inactive)
    }
}
