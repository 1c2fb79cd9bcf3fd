//! Audio buffer implementations.
//!
//! - [`StreamReassembler`] - Accumulates decoded samples and emits fixed-size playback buffers

pub mod reassembler;

pub use reassembler::StreamReassembler;
