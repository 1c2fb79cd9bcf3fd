//! Gain (volume) effect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::AudioEffect;

/// Shared volume control for a [`Gain`] running on the audio thread.
///
/// The factor is stored as `f32` bits so the audio callback never locks.
#[derive(Debug, Clone)]
pub struct GainControl {
    factor: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: Arc::new(AtomicU32::new(factor.to_bits())),
        }
    }

    pub fn set(&self, factor: f32) {
        self.factor.store(factor.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.factor.load(Ordering::Acquire))
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Applies a dynamic gain (volume multiplier) to all samples.
///
/// # Example
///
/// ```ignore
/// let volume = GainControl::new(1.0);
/// let chain: EffectChain = vec![Box::new(Gain::new(volume.clone()))];
/// // Later, from any thread:
/// volume.set(0.5); // 50% volume
/// ```
pub struct Gain {
    control: GainControl,
}

impl Gain {
    pub fn new(control: GainControl) -> Self {
        Self { control }
    }
}

impl AudioEffect for Gain {
    fn process(&mut self, samples: &mut [f32]) {
        let factor = self.control.get();
        if factor == 1.0 {
            return;
        }
        for sample in samples {
            *sample = (*sample * factor).clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_samples() {
        let control = GainControl::new(0.5);
        let mut gain = Gain::new(control.clone());

        let mut samples = [0.5, -1.0, 0.0];
        gain.process(&mut samples);
        assert_eq!(samples, [0.25, -0.5, 0.0]);

        control.set(4.0);
        let mut samples = [0.5, -0.5];
        gain.process(&mut samples);
        assert_eq!(samples, [1.0, -1.0]);
    }

    #[test]
    fn test_negative_gain_is_clamped_to_silence() {
        let control = GainControl::default();
        control.set(-2.0);
        assert_eq!(control.get(), 0.0);
    }
}
