//! Audio data types and processing stages.
//!
//! # Data Types
//! - [`frame::PlaybackBuffer`] - A fixed-size block of mono `f32` samples ready for scheduling
//!
//! # Decoding
//! - [`pcm::Pcm16Decoder`] - Raw 16-bit little-endian PCM to normalized floats
//!
//! # Buffers
//! - [`buffers::StreamReassembler`] - Regroups arbitrary chunks into fixed-size buffers
//!
//! # Effects
//! - [`effects::gain`] - Volume control applied on the output thread

pub mod buffers;
pub mod effects;
pub mod frame;
pub mod pcm;

pub use buffers::StreamReassembler;
pub use effects::{AudioEffect, EffectChain, Gain, GainControl};
pub use frame::PlaybackBuffer;
pub use pcm::{DecodedChunk, Pcm16Decoder};
