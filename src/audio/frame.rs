use std::sync::Arc;

/// An immutable block of mono samples ready to be scheduled on a device.
///
/// Cloning is cheap: the sample data is shared. A buffer is normally exactly
/// one configured buffer size long; only the final buffer of a stream,
/// flushed at end-of-stream, may be shorter and is then marked partial.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    data: Arc<[f32]>,
    sample_rate: u32,
    partial: bool,
}

impl PlaybackBuffer {
    /// Create a full-size playback buffer.
    pub fn new(data: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            partial: false,
        }
    }

    /// Create the shorter, final buffer of a stream.
    pub fn partial(data: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            partial: true,
        }
    }

    /// Access the underlying sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the sample rate.
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_buffer_duration() {
        let buffer = PlaybackBuffer::new(vec![0.0; 7680], 24_000);
        assert_eq!(buffer.len(), 7680);
        assert!(!buffer.is_empty());
        assert!(!buffer.is_partial());
        assert!((buffer.duration_secs() - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_clone_shares_samples() {
        let buffer = PlaybackBuffer::partial(vec![0.25, -0.25], 16_000);
        let clone = buffer.clone();

        assert!(clone.is_partial());
        assert_eq!(clone, buffer);
        assert!(std::ptr::eq(clone.data().as_ptr(), buffer.data().as_ptr()));
    }
}
