//! Core pipeline traits.
//!
//! This module defines the fundamental abstraction for data processing:
//!
//! - [`Node`] - A processing stage that transforms input data to output data
//!
//! The data path of the streamer is a fixed chain of nodes:
//! [`Pcm16Decoder`](crate::audio::Pcm16Decoder) turns bytes into samples and
//! [`StreamReassembler`](crate::audio::StreamReassembler) turns samples into
//! playback buffers.

/// A processing node that transforms input to output.
///
/// Nodes are driven by a single owner, one call at a time, so they may keep
/// internal state without locking.
pub trait Node: Send {
    type Input<'a>;
    type Output;

    /// Process input data and optionally produce output.
    ///
    /// Returns `None` if the node is buffering data and not ready to emit output yet.
    fn process(&mut self, input: Self::Input<'_>) -> Option<Self::Output>;
}
