//! The synchronous streaming core.
//!
//! [`StreamController`] wires decoder, reassembler, scheduler and completion
//! monitor together and owns the session lifecycle:
//!
//! ```text
//! Idle --first buffer scheduled--> Playing --end of stream--> Draining
//! Draining --last buffer played (periodic check)--> Completed
//! any --device rejects a buffer--> Failed
//! any --reset()/initialize()--> Idle
//! ```
//!
//! It is single-threaded by construction (`&mut self` everywhere). Use
//! [`AudioStreamer`](crate::playback::AudioStreamer) to share it between a
//! producer and the completion timer.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::buffers::StreamReassembler;
use crate::audio::frame::PlaybackBuffer;
use crate::audio::pcm::Pcm16Decoder;
use crate::config::StreamerConfig;
use crate::error::{Result, StreamError};
use crate::io::OutputDevice;
use crate::pipeline::Node;
use crate::playback::monitor::{Completion, CompletionCallback, CompletionMonitor, Notification};
use crate::playback::scheduler::{PlaybackScheduler, SchedulerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Playing,
    Draining,
    Completed,
    Failed,
}

impl StreamState {
    /// The session has ended and takes no more data until reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Failed)
    }
}

pub struct StreamController<D> {
    device: D,
    config: StreamerConfig,
    initialized: bool,
    state: StreamState,
    session_id: Uuid,
    decoder: Pcm16Decoder,
    reassembler: StreamReassembler,
    scheduler: PlaybackScheduler,
    monitor: CompletionMonitor,
}

impl<D: OutputDevice> StreamController<D> {
    /// Create an uninitialized controller. Chunks are dropped until
    /// [`initialize`](Self::initialize) is called.
    pub fn new(device: D) -> Self {
        let config = StreamerConfig::default();
        Self {
            device,
            initialized: false,
            state: StreamState::Idle,
            session_id: Uuid::new_v4(),
            decoder: Pcm16Decoder::new(),
            reassembler: StreamReassembler::new(config.buffer_size(), config.sample_rate_hz),
            scheduler: PlaybackScheduler::new(
                config.sample_rate_hz,
                config.initial_buffer_delay_secs,
            ),
            monitor: CompletionMonitor::new(),
            config,
        }
    }

    /// Apply `config` and start a fresh session in [`StreamState::Idle`].
    pub fn initialize(&mut self, config: StreamerConfig) -> Result<()> {
        config.validate()?;
        self.check_device_rate(config.sample_rate_hz)?;

        self.reset();
        self.reassembler
            .reconfigure(config.buffer_size(), config.sample_rate_hz);
        self.scheduler
            .reconfigure(config.sample_rate_hz, config.initial_buffer_delay_secs);
        info!(
            session = %self.session_id,
            "Streamer initialized: {} Hz, {} samples per buffer, {:.3}s initial delay",
            config.sample_rate_hz,
            config.buffer_size(),
            config.initial_buffer_delay_secs
        );
        self.config = config;
        self.initialized = true;
        Ok(())
    }

    /// Feed one raw PCM16 chunk. This is the only data-path entry point.
    ///
    /// Input that cannot be accepted (not initialized, stream already ended)
    /// is dropped with a warning and `Ok(())` is returned. A device failure
    /// ends the session and is returned as [`StreamError::Scheduling`].
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if !self.initialized {
            warn!("{}, dropping {} bytes", StreamError::NotInitialized, chunk.len());
            return Ok(());
        }
        if self.state != StreamState::Idle && self.state != StreamState::Playing {
            warn!(
                session = %self.session_id,
                "Dropping {} bytes received in state {:?}",
                chunk.len(),
                self.state
            );
            return Ok(());
        }

        let Some(samples) = self.decoder.process(chunk) else {
            return Ok(());
        };
        let Some(buffers) = self.reassembler.process(samples.as_slice()) else {
            return Ok(());
        };

        let now = self.device.current_time();
        for buffer in buffers {
            self.scheduler.enqueue(buffer, now);
        }
        self.pump()
    }

    /// Mark that no more chunks will arrive.
    ///
    /// The leftover tail is scheduled as a final partial buffer and the
    /// stream moves to [`StreamState::Draining`]. Calling it again is a no-op.
    pub fn signal_end_of_stream(&mut self) -> Result<()> {
        if !self.initialized {
            warn!("{}, ignoring end of stream", StreamError::NotInitialized);
            return Ok(());
        }
        if self.state != StreamState::Idle && self.state != StreamState::Playing {
            debug!(session = %self.session_id, "End of stream already handled ({:?})", self.state);
            return Ok(());
        }

        if let Some(last) = self.reassembler.flush() {
            let now = self.device.current_time();
            self.enqueue_final(last, now);
            self.pump()?;
        }

        info!(
            session = %self.session_id,
            "End of stream, draining until {:.4}s",
            self.scheduler.stream_end_time().unwrap_or_default()
        );
        self.state = StreamState::Draining;
        Ok(())
    }

    fn enqueue_final(&mut self, buffer: PlaybackBuffer, now: f64) {
        debug!(
            session = %self.session_id,
            "Flushing {} tail samples as final buffer",
            buffer.len()
        );
        self.scheduler.enqueue(buffer, now);
    }

    fn pump(&mut self) -> Result<()> {
        match self.scheduler.pump(&mut self.device) {
            Ok(scheduled) => {
                if scheduled > 0 && self.state == StreamState::Idle {
                    info!(session = %self.session_id, "Playback started");
                    self.state = StreamState::Playing;
                }
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.session_id, "Session failed: {}", e);
                self.reassembler.clear();
                self.state = StreamState::Failed;
                self.monitor.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// One run of the periodic drain check. Returns `true` on the call that
    /// moves the stream to [`StreamState::Completed`].
    pub fn check_completion(&mut self) -> bool {
        if self.state != StreamState::Draining {
            return false;
        }
        let completed = self.monitor.observe(
            true,
            self.scheduler.is_queue_empty(),
            self.device.current_time(),
            self.scheduler.stream_end_time(),
        );
        if completed {
            self.state = StreamState::Completed;
        }
        completed
    }

    /// Take the pending completion, if one is due. Deliver it with
    /// [`Notification::deliver`] once any lock around the controller is released.
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.monitor.take_notification()
    }

    /// Clear all pending audio and scheduling state and start a new session.
    ///
    /// Audio already committed to the device is not retracted.
    pub fn reset(&mut self) {
        self.reassembler.clear();
        self.scheduler.reset();
        self.monitor.reset();
        self.state = StreamState::Idle;
        let previous = std::mem::replace(&mut self.session_id, Uuid::new_v4());
        debug!(session = %self.session_id, previous = %previous, "Streamer reset");
    }

    /// Register the completion callback, replacing any previous one.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(Completion) + Send + Sync + 'static,
    {
        self.set_completion_callback(std::sync::Arc::new(callback));
    }

    pub fn set_completion_callback(&mut self, callback: CompletionCallback) {
        self.monitor.set_callback(callback);
    }

    /// Change the sample rate, recomputing the buffer size.
    ///
    /// Only allowed while nothing is in flight: the tail and queue must be
    /// empty and the stream idle. Otherwise the change is rejected.
    pub fn set_sample_rate(&mut self, sample_rate_hz: u32) -> Result<()> {
        if !self.is_idle() {
            return Err(StreamError::ConfigurationMisuse(format!(
                "cannot change sample rate to {} Hz while stream is {:?} with {} samples pending",
                sample_rate_hz,
                self.state,
                self.reassembler.buffered_samples()
            )));
        }

        let config = StreamerConfig {
            sample_rate_hz,
            ..self.config.clone()
        };
        config.validate()?;
        self.check_device_rate(config.sample_rate_hz)?;
        self.reassembler
            .reconfigure(config.buffer_size(), config.sample_rate_hz);
        self.scheduler
            .reconfigure(config.sample_rate_hz, config.initial_buffer_delay_secs);
        info!(
            "Sample rate set to {} Hz ({} samples per buffer)",
            sample_rate_hz,
            config.buffer_size()
        );
        self.config = config;
        Ok(())
    }

    /// A device opened at a fixed rate only accepts buffers at that rate.
    fn check_device_rate(&self, sample_rate_hz: u32) -> Result<()> {
        match self.device.sample_rate() {
            Some(device_rate) if device_rate != sample_rate_hz => {
                Err(StreamError::InvalidConfig(format!(
                    "stream sample rate {} Hz does not match output device rate {} Hz",
                    sample_rate_hz, device_rate
                )))
            }
            _ => Ok(()),
        }
    }

    fn is_idle(&self) -> bool {
        self.state == StreamState::Idle
            && self.reassembler.buffered_samples() == 0
            && self.scheduler.state() == SchedulerState::Idle
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn next_start_time(&self) -> Option<f64> {
        self.scheduler.next_start_time()
    }

    pub fn stream_end_time(&self) -> Option<f64> {
        self.scheduler.stream_end_time()
    }

    pub fn queued_buffers(&self) -> usize {
        self.scheduler.queued_buffers()
    }

    pub fn buffered_samples(&self) -> usize {
        self.reassembler.buffered_samples()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// How far the next buffer's start lies ahead of the device clock.
    /// `None` until the session has scheduled something.
    pub fn schedule_lead(&self) -> Option<f64> {
        self.next_start_time()
            .map(|next| (next - self.device.current_time()).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VirtualOutput;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_config() -> StreamerConfig {
        // 1000 Hz, 100 ms -> 100 samples per buffer
        StreamerConfig {
            sample_rate_hz: 1000,
            buffer_millis: 100,
            initial_buffer_delay_secs: 0.05,
            completion_check_interval_ms: 10,
        }
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Virtual device that reports a fixed output rate, like an opened
    /// hardware stream, and rejects buffers at any other rate.
    struct FixedRateOutput {
        inner: VirtualOutput,
        rate: u32,
    }

    impl OutputDevice for FixedRateOutput {
        fn current_time(&self) -> f64 {
            self.inner.current_time()
        }

        fn schedule_buffer(&mut self, buffer: PlaybackBuffer, start_time: f64) -> anyhow::Result<()> {
            anyhow::ensure!(buffer.sample_rate() == self.rate, "rate mismatch");
            self.inner.schedule_buffer(buffer, start_time)
        }

        fn sample_rate(&self) -> Option<u32> {
            Some(self.rate)
        }
    }

    fn controller() -> (StreamController<VirtualOutput>, VirtualOutput) {
        let device = VirtualOutput::manual();
        let mut controller = StreamController::new(device.clone());
        controller.initialize(small_config()).unwrap();
        (controller, device)
    }

    #[test]
    fn test_chunks_dropped_before_initialize() {
        let device = VirtualOutput::manual();
        let mut controller = StreamController::new(device.clone());

        assert!(controller.add_chunk(&pcm(&[1; 500])).is_ok());
        assert_eq!(controller.buffered_samples(), 0);
        assert_eq!(device.scheduled_count(), 0);
        assert_eq!(controller.state(), StreamState::Idle);
    }

    #[test]
    fn test_first_buffer_starts_playing() {
        let (mut controller, device) = controller();

        controller.add_chunk(&pcm(&[100; 60])).unwrap();
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.buffered_samples(), 60);

        controller.add_chunk(&pcm(&[100; 60])).unwrap();
        assert_eq!(controller.state(), StreamState::Playing);
        assert_eq!(controller.buffered_samples(), 20);
        assert_eq!(device.scheduled_count(), 1);
        assert!((device.scheduled()[0].start_time - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_empty_chunk_changes_nothing() {
        let (mut controller, device) = controller();
        controller.add_chunk(&[]).unwrap();

        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.scheduler_state(), SchedulerState::Idle);
        assert_eq!(controller.buffered_samples(), 0);
        assert_eq!(device.scheduled_count(), 0);
    }

    #[test]
    fn test_end_of_stream_flushes_tail_and_completes_once() {
        let (mut controller, device) = controller();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        controller.on_complete(move |completion| {
            assert_eq!(completion, Completion::Finished);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        controller.add_chunk(&pcm(&[7; 130])).unwrap();
        controller.signal_end_of_stream().unwrap();
        assert_eq!(controller.state(), StreamState::Draining);

        let scheduled = device.scheduled();
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled[1].buffer.is_partial());
        assert_eq!(scheduled[1].buffer.len(), 30);
        let end = controller.stream_end_time().unwrap();
        assert!((end - (0.05 + 0.13)).abs() < 1e-9);

        device.set_time(end - 0.01);
        assert!(!controller.check_completion());
        assert_eq!(controller.state(), StreamState::Draining);

        device.set_time(end);
        for _ in 0..5 {
            controller.check_completion();
            if let Some(notification) = controller.take_notification() {
                notification.deliver();
            }
        }
        assert_eq!(controller.state(), StreamState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chunks_after_end_of_stream_are_dropped() {
        let (mut controller, device) = controller();
        controller.add_chunk(&pcm(&[1; 100])).unwrap();
        controller.signal_end_of_stream().unwrap();

        controller.add_chunk(&pcm(&[1; 500])).unwrap();
        assert_eq!(device.scheduled_count(), 1);
        assert_eq!(controller.buffered_samples(), 0);

        // second signal is a no-op
        controller.signal_end_of_stream().unwrap();
        assert_eq!(controller.state(), StreamState::Draining);
    }

    #[test]
    fn test_end_of_stream_without_data() {
        let (mut controller, device) = controller();
        controller.signal_end_of_stream().unwrap();
        assert!(controller.check_completion());
        assert_eq!(controller.state(), StreamState::Completed);
        assert_eq!(device.scheduled_count(), 0);
        assert_eq!(
            controller.take_notification().unwrap().completion(),
            &Completion::Finished
        );
    }

    #[test]
    fn test_scheduling_failure_ends_session() {
        let (mut controller, device) = controller();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        controller.on_complete(move |completion| {
            if let Completion::Failed { .. } = completion {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        device.fail_with("no device");
        let err = controller.add_chunk(&pcm(&[1; 250])).unwrap_err();
        assert!(matches!(err, StreamError::Scheduling(_)));
        assert_eq!(controller.state(), StreamState::Failed);
        assert_eq!(controller.queued_buffers(), 0);
        controller.take_notification().unwrap().deliver();

        // further chunks are dropped, no second notification
        device.recover();
        controller.add_chunk(&pcm(&[1; 250])).unwrap();
        assert_eq!(device.scheduled_count(), 0);
        assert!(controller.take_notification().is_none());
        assert!(!controller.check_completion());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_mid_stream_starts_fresh_cursor() {
        let (mut controller, device) = controller();
        controller.add_chunk(&pcm(&[1; 250])).unwrap();
        let old_session = controller.session_id();
        assert_eq!(controller.buffered_samples(), 50);

        controller.reset();
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.buffered_samples(), 0);
        assert_eq!(controller.queued_buffers(), 0);
        assert_eq!(controller.next_start_time(), None);
        assert_ne!(controller.session_id(), old_session);

        device.set_time(3.0);
        controller.add_chunk(&pcm(&[2; 100])).unwrap();
        let last = device.scheduled().pop().unwrap();
        assert!((last.start_time - 3.05).abs() < 1e-12);
        assert_eq!(last.buffer.data(), &[2.0f32 / 32768.0; 100][..]);
    }

    #[test]
    fn test_sample_rate_change_only_while_idle() {
        let (mut controller, _device) = controller();

        controller.set_sample_rate(2000).unwrap();
        assert_eq!(controller.config().buffer_size(), 200);

        controller.add_chunk(&pcm(&[1; 10])).unwrap();
        let err = controller.set_sample_rate(4000).unwrap_err();
        assert!(matches!(err, StreamError::ConfigurationMisuse(_)));
        assert_eq!(controller.config().sample_rate_hz, 2000);

        controller.reset();
        controller.set_sample_rate(4000).unwrap();
        assert_eq!(controller.config().buffer_size(), 400);
    }

    #[test]
    fn test_sample_rate_change_respects_device_rate() {
        let device = VirtualOutput::manual();
        let mut controller = StreamController::new(FixedRateOutput {
            inner: device.clone(),
            rate: 24_000,
        });
        assert_eq!(controller.device().sample_rate(), Some(24_000));

        let err = controller
            .initialize(StreamerConfig::with_sample_rate(16_000))
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig(_)));

        controller.initialize(StreamerConfig::default()).unwrap();
        let err = controller.set_sample_rate(16_000).unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig(_)));
        assert_eq!(controller.config().sample_rate_hz, 24_000);
        assert_eq!(controller.config().buffer_size(), 7680);

        // the stream keeps working at the device rate
        controller.add_chunk(&vec![0u8; 32_000]).unwrap();
        assert_eq!(controller.state(), StreamState::Playing);
        assert_eq!(device.scheduled_count(), 2);
        assert!(device.scheduled().iter().all(|s| s.buffer.sample_rate() == 24_000));
    }

    #[test]
    fn test_scheduling_failure_on_end_of_stream_flush() {
        let (mut controller, device) = controller();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        controller.on_complete(move |completion| {
            assert!(matches!(completion, Completion::Failed { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // one full buffer scheduled, 30 samples left in the tail
        controller.add_chunk(&pcm(&[3; 130])).unwrap();
        assert_eq!(controller.buffered_samples(), 30);

        device.fail_with("device lost");
        let err = controller.signal_end_of_stream().unwrap_err();
        assert!(matches!(err, StreamError::Scheduling(_)));
        assert_eq!(controller.state(), StreamState::Failed);
        assert_eq!(controller.buffered_samples(), 0);
        assert_eq!(device.scheduled_count(), 1);

        controller.take_notification().unwrap().deliver();
        assert!(!controller.check_completion());
        controller.signal_end_of_stream().unwrap();
        assert!(controller.take_notification().is_none());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_schedule_lead_tracks_device_clock() {
        let (mut controller, device) = controller();
        assert_eq!(controller.schedule_lead(), None);

        controller.add_chunk(&pcm(&[1; 300])).unwrap();
        // origin 0.05, three 100 ms buffers
        assert!((controller.schedule_lead().unwrap() - 0.35).abs() < 1e-9);

        device.set_time(0.2);
        assert!((controller.schedule_lead().unwrap() - 0.15).abs() < 1e-9);

        device.set_time(1.0);
        assert_eq!(controller.schedule_lead(), Some(0.0));
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let device = VirtualOutput::manual();
        let mut controller = StreamController::new(device);
        let err = controller
            .initialize(StreamerConfig::with_sample_rate(0))
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig(_)));
        assert!(!controller.is_initialized());
    }

    #[test]
    fn test_initialize_resets_session() {
        let (mut controller, _device) = controller();
        controller.add_chunk(&pcm(&[1; 150])).unwrap();
        assert_eq!(controller.state(), StreamState::Playing);

        controller.initialize(small_config()).unwrap();
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.buffered_samples(), 0);
        assert_eq!(controller.next_start_time(), None);
    }
}
