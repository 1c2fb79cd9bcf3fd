//! Re-chunks a continuous sample stream into fixed-size playback buffers.

use std::collections::VecDeque;

use crate::audio::frame::PlaybackBuffer;
use crate::pipeline::Node;

/// Accumulates decoded samples and slices off [`PlaybackBuffer`]s once a
/// full buffer's worth has arrived.
///
/// Incoming chunk sizes are unrelated to the buffer size, so most small
/// chunks produce nothing. Samples leave in arrival order. After every
/// [`ingest`](Self::ingest) the tail holds fewer than `buffer_size` samples.
pub struct StreamReassembler {
    tail: VecDeque<f32>,
    buffer_size: usize,
    sample_rate: u32,
}

impl StreamReassembler {
    pub fn new(buffer_size: usize, sample_rate: u32) -> Self {
        Self {
            tail: VecDeque::with_capacity(buffer_size * 2),
            buffer_size,
            sample_rate,
        }
    }

    pub fn ingest(&mut self, samples: &[f32]) -> Vec<PlaybackBuffer> {
        self.tail.extend(samples.iter().copied());

        let mut ready = Vec::with_capacity(self.tail.len() / self.buffer_size);
        while self.tail.len() >= self.buffer_size {
            let samples: Vec<f32> = self.tail.drain(..self.buffer_size).collect();
            ready.push(PlaybackBuffer::new(samples, self.sample_rate));
        }
        ready
    }

    /// Emit whatever is left in the tail as a partial buffer.
    pub fn flush(&mut self) -> Option<PlaybackBuffer> {
        if self.tail.is_empty() {
            return None;
        }
        let samples: Vec<f32> = self.tail.drain(..).collect();
        Some(PlaybackBuffer::partial(samples, self.sample_rate))
    }

    pub fn clear(&mut self) {
        self.tail.clear();
    }

    /// Samples decoded but not yet part of a playback buffer.
    pub fn buffered_samples(&self) -> usize {
        self.tail.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Change the buffer geometry. The tail must already be empty.
    pub(crate) fn reconfigure(&mut self, buffer_size: usize, sample_rate: u32) {
        debug_assert!(self.tail.is_empty());
        self.buffer_size = buffer_size;
        self.sample_rate = sample_rate;
    }
}

impl Node for StreamReassembler {
    type Input<'a> = &'a [f32];
    type Output = Vec<PlaybackBuffer>;

    fn process(&mut self, input: Self::Input<'_>) -> Option<Self::Output> {
        let ready = self.ingest(input);
        if ready.is_empty() { None } else { Some(ready) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32 * 1e-4).collect()
    }

    #[test]
    fn test_small_chunks_accumulate() {
        let mut reassembler = StreamReassembler::new(100, 1000);

        assert!(reassembler.ingest(&ramp(0, 40)).is_empty());
        assert!(reassembler.ingest(&ramp(40, 40)).is_empty());
        assert_eq!(reassembler.buffered_samples(), 80);

        let ready = reassembler.ingest(&ramp(80, 40));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].data(), ramp(0, 100).as_slice());
        assert_eq!(reassembler.buffered_samples(), 20);
    }

    #[test]
    fn test_large_chunk_produces_multiple_buffers_in_order() {
        let mut reassembler = StreamReassembler::new(100, 1000);

        let ready = reassembler.ingest(&ramp(0, 350));
        assert_eq!(ready.len(), 3);
        for (n, buffer) in ready.iter().enumerate() {
            assert_eq!(buffer.len(), 100);
            assert_eq!(buffer.data(), ramp(n * 100, 100).as_slice());
            assert!(!buffer.is_partial());
        }
        assert_eq!(reassembler.buffered_samples(), 50);
    }

    #[test]
    fn test_tail_always_smaller_than_buffer() {
        let mut reassembler = StreamReassembler::new(64, 1000);
        let mut offset = 0;
        for len in [1, 63, 64, 65, 127, 128, 129, 0, 3] {
            reassembler.ingest(&ramp(offset, len));
            offset += len;
            assert!(reassembler.buffered_samples() < 64);
        }
    }

    #[test]
    fn test_flush_emits_partial_tail() {
        let mut reassembler = StreamReassembler::new(100, 1000);
        reassembler.ingest(&ramp(0, 130));

        let last = reassembler.flush().unwrap();
        assert!(last.is_partial());
        assert_eq!(last.data(), ramp(100, 30).as_slice());
        assert_eq!(reassembler.buffered_samples(), 0);
        assert!(reassembler.flush().is_none());
    }

    #[test]
    fn test_node_buffers_until_full() {
        let mut reassembler = StreamReassembler::new(4, 1000);
        assert!(reassembler.process(&[0.1f32, 0.2][..]).is_none());
        let out = reassembler.process(&[0.3f32, 0.4, 0.5][..]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data(), &[0.1f32, 0.2, 0.3, 0.4][..]);
    }
}
