//! Window statistics and the ratio-of-ratios saturation estimate

use thiserror_no_std::Error;

use crate::config::Spo2Calibration;

/// Why a window could not be turned into a saturation value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spo2ComputeError {
    #[error("no samples in the measurement window")]
    NoSamples,
    #[error("zero DC level, sensor saw no light")]
    ZeroDc,
    #[error("infrared AC component is zero, ratio undefined")]
    FlatSignal,
}

/// DC and AC components of one channel over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelStats {
    /// Mean signal level
    pub dc: f64,
    /// Root of the summed squared deviation over the window length in seconds
    pub ac: f64,
    /// Number of samples
    pub count: usize,
}

impl ChannelStats {
    /// Compute DC and AC of `samples`.
    ///
    /// The squared deviations are normalized by the window duration in
    /// seconds, not by the sample count.
    pub fn compute(samples: &[u32], window_secs: f64) -> Result<Self, Spo2ComputeError> {
        if samples.is_empty() {
            return Err(Spo2ComputeError::NoSamples);
        }

        let count = samples.len();
        let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
        let dc = sum as f64 / count as f64;

        let squared_sum: f64 = samples
            .iter()
            .map(|&s| {
                let deviation = f64::from(s) - dc;
                deviation * deviation
            })
            .sum();

        Ok(Self {
            dc,
            ac: libm::sqrt(squared_sum / window_secs),
            count,
        })
    }

    /// AC over DC, the perfusion ratio of this channel.
    pub fn perfusion(&self) -> Result<f64, Spo2ComputeError> {
        if self.dc == 0.0 {
            return Err(Spo2ComputeError::ZeroDc);
        }
        Ok(self.ac / self.dc)
    }
}

/// Result of one SpO2 window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spo2Estimate {
    /// Saturation in percent, clamped to 0..=100
    pub percent: f32,
    /// Ratio of ratios R
    pub ratio: f64,
    pub red: ChannelStats,
    pub infrared: ChannelStats,
}

/// `R = (AC_red / DC_red) / (AC_ir / DC_ir)`
pub fn ratio_of_ratios(red: &ChannelStats, infrared: &ChannelStats) -> Result<f64, Spo2ComputeError> {
    let red_perfusion = red.perfusion()?;
    let infrared_perfusion = infrared.perfusion()?;

    if infrared_perfusion == 0.0 {
        return Err(Spo2ComputeError::FlatSignal);
    }

    Ok(red_perfusion / infrared_perfusion)
}

/// Estimate oxygen saturation from one window of Red and Infrared samples.
pub fn compute_spo2(
    red: &[u32],
    infrared: &[u32],
    window_secs: f64,
    calibration: Spo2Calibration,
) -> Result<Spo2Estimate, Spo2ComputeError> {
    let red = ChannelStats::compute(red, window_secs)?;
    let infrared = ChannelStats::compute(infrared, window_secs)?;
    let ratio = ratio_of_ratios(&red, &infrared)?;

    Ok(Spo2Estimate {
        percent: calibration.apply(ratio as f32).clamp(0.0, 100.0),
        ratio,
        red,
        infrared,
    })
}
