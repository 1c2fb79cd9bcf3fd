//! Output devices.
//!
//! This module provides the [`OutputDevice`] seam the scheduler talks to and
//! its implementations:
//!
//! - [`CpalOutput`] - Speaker playback via cpal
//! - [`VirtualOutput`] - Software clock that records scheduled buffers, for tests and dry runs

pub mod audio;
pub mod output;
pub mod virtual_device;

pub use audio::CpalOutput;
pub use output::OutputDevice;
pub use virtual_device::{ScheduledPlayback, VirtualOutput};
