//! PCM16 decoding.
//!
//! Incoming chunks are signed 16-bit little-endian mono samples. They are
//! normalized to `f32` in `[-1.0, 1.0]` as `value / 32768`.

use dasp_sample::Sample as DaspSample;
use tracing::{error, warn};

use crate::error::StreamError;
use crate::pipeline::Node;

pub const BYTES_PER_SAMPLE: usize = 2;

/// Result of decoding one raw chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedChunk {
    pub samples: Vec<f32>,
    /// The chunk had an odd length and its last byte was ignored.
    pub dropped_trailing_byte: bool,
    /// Number of samples that could not be read and were skipped.
    pub skipped_samples: usize,
}

/// Stateless PCM16 to normalized `f32` decoder.
///
/// Failures are isolated per sample: a bad sample is logged and skipped,
/// the rest of the chunk still decodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pcm16Decoder;

impl Pcm16Decoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, chunk: &[u8]) -> DecodedChunk {
        let mut decoded = DecodedChunk {
            samples: Vec::with_capacity(chunk.len() / BYTES_PER_SAMPLE),
            ..DecodedChunk::default()
        };

        if chunk.len() % BYTES_PER_SAMPLE != 0 {
            warn!(
                "{}, dropping trailing byte",
                StreamError::MalformedChunk { len: chunk.len() }
            );
            decoded.dropped_trailing_byte = true;
        }

        for (index, pair) in chunk.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
            match <[u8; BYTES_PER_SAMPLE]>::try_from(pair) {
                Ok(bytes) => {
                    let raw = i16::from_le_bytes(bytes);
                    decoded.samples.push(raw.to_sample::<f32>());
                }
                // unreachable with chunks_exact; kept as the per-sample isolation point
                Err(e) => {
                    error!("{}: {}", StreamError::SampleDecode { index }, e);
                    decoded.skipped_samples += 1;
                }
            }
        }

        decoded
    }
}

impl Node for Pcm16Decoder {
    type Input<'a> = &'a [u8];
    type Output = Vec<f32>;

    fn process(&mut self, input: Self::Input<'_>) -> Option<Self::Output> {
        let decoded = self.decode(input);
        if decoded.samples.is_empty() {
            None
        } else {
            Some(decoded.samples)
        }
    }
}
