use heapless::Vec;

use crate::sensors::PpgSample;

/// Parallel Red/Infrared sample storage for one measurement window.
///
/// Filled by exactly one engine and reset at the start of every cycle, so a
/// cancelled cycle never leaks samples into the next one.
pub struct MeasurementBuffer<const N: usize> {
    red: Vec<u32, N>,
    infrared: Vec<u32, N>,
}

impl<const N: usize> MeasurementBuffer<N> {
    pub const fn new() -> Self {
        Self {
            red: Vec::new(),
            infrared: Vec::new(),
        }
    }

    /// Append one sample pair. Returns false once the window is full.
    pub fn push(&mut self, sample: PpgSample) -> bool {
        if self.is_full() {
            return false;
        }
        // Both vectors have the same length, so neither push can fail here
        let _ = self.red.push(sample.red);
        let _ = self.infrared.push(sample.infrared);
        true
    }

    pub fn reset(&mut self) {
        self.red.clear();
        self.infrared.clear();
    }

    pub fn len(&self) -> usize {
        self.red.len()
    }

    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.red.len() == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn red(&self) -> &[u32] {
        &self.red
    }

    pub fn infrared(&self) -> &[u32] {
        &self.infrared
    }
}

impl<const N: usize> Default for MeasurementBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
