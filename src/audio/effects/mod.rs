//! Audio effects applied downstream of the scheduler.
//!
//! Effects run on the device's audio thread, after a scheduled buffer has
//! been positioned on the device clock and before it is written to the
//! hardware. They transform mono samples in place and must not block.

pub mod gain;

pub use gain::{Gain, GainControl};

/// Pure audio processing effect.
pub trait AudioEffect: Send {
    fn process(&mut self, samples: &mut [f32]);
}

/// Effects applied in order by an output device.
pub type EffectChain = Vec<Box<dyn AudioEffect>>;

/// Run `samples` through every effect in `chain`.
pub fn apply_chain(chain: &mut EffectChain, samples: &mut [f32]) {
    for effect in chain.iter_mut() {
        effect.process(samples);
    }
}
