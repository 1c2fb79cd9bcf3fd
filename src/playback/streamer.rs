//! Thread-safe streaming handle with a periodic completion timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StreamerConfig;
use crate::error::Result;
use crate::io::OutputDevice;
use crate::playback::controller::{StreamController, StreamState};
use crate::playback::monitor::{Completion, Notification};

type SharedController<D> = Arc<Mutex<StreamController<D>>>;

fn lock<D>(controller: &Mutex<StreamController<D>>) -> MutexGuard<'_, StreamController<D>> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Public entry point for streaming PCM16 audio to an [`OutputDevice`].
///
/// Every call is serialized through one controller, so producers on any
/// thread may call [`add_chunk`](Self::add_chunk) back to back. Completion
/// callbacks run without the controller locked and may call back into the
/// streamer, e.g. to [`reset`](Self::reset) for the next utterance.
///
/// # Example
///
/// ```ignore
/// let streamer = AudioStreamer::new(VirtualOutput::realtime());
/// streamer.initialize(StreamerConfig::default())?;
/// streamer.on_complete(|completion| println!("done: {completion:?}"));
/// for chunk in chunks {
///     streamer.add_chunk(&chunk)?;
/// }
/// streamer.signal_end_of_stream()?;
/// ```
pub struct AudioStreamer<D: OutputDevice + 'static> {
    controller: SharedController<D>,
    timer: Mutex<Option<CompletionTimer>>,
}

impl<D: OutputDevice + 'static> AudioStreamer<D> {
    pub fn new(device: D) -> Self {
        Self {
            controller: Arc::new(Mutex::new(StreamController::new(device))),
            timer: Mutex::new(None),
        }
    }

    pub fn initialize(&self, config: StreamerConfig) -> Result<()> {
        self.cancel_timer();
        lock(&self.controller).initialize(config)
    }

    pub fn add_chunk(&self, chunk: &[u8]) -> Result<()> {
        let (result, notification) = {
            let mut controller = lock(&self.controller);
            let result = controller.add_chunk(chunk);
            (result, controller.take_notification())
        };
        deliver(notification);
        result
    }

    /// Mark the end of the stream and start the periodic completion check.
    pub fn signal_end_of_stream(&self) -> Result<()> {
        let (result, notification, interval, draining) = {
            let mut controller = lock(&self.controller);
            let result = controller.signal_end_of_stream();
            // an already drained stream completes without waiting for a tick
            controller.check_completion();
            (
                result,
                controller.take_notification(),
                controller.config().completion_check_interval(),
                controller.state() == StreamState::Draining,
            )
        };
        deliver(notification);
        result?;

        if draining {
            let timer = CompletionTimer::spawn(Arc::downgrade(&self.controller), interval)?;
            self.replace_timer(Some(timer));
        }
        Ok(())
    }

    /// Drop all pending audio and start a new session. The completion timer
    /// is cancelled; audio already committed to the device still plays.
    pub fn reset(&self) {
        self.cancel_timer();
        lock(&self.controller).reset();
    }

    /// Register the completion callback, replacing any previous one.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(Completion) + Send + Sync + 'static,
    {
        lock(&self.controller).on_complete(callback);
    }

    pub fn set_sample_rate(&self, sample_rate_hz: u32) -> Result<()> {
        lock(&self.controller).set_sample_rate(sample_rate_hz)
    }

    pub fn state(&self) -> StreamState {
        lock(&self.controller).state()
    }

    pub fn session_id(&self) -> Uuid {
        lock(&self.controller).session_id()
    }

    pub fn config(&self) -> StreamerConfig {
        lock(&self.controller).config().clone()
    }

    /// See [`StreamController::schedule_lead`]. Producers that read faster
    /// than real time wait on this to bound how much audio is committed ahead.
    pub fn schedule_lead(&self) -> Option<f64> {
        lock(&self.controller).schedule_lead()
    }

    pub fn device_available(&self) -> bool {
        lock(&self.controller).device().is_available()
    }

    /// Run `f` with the controller locked, for inspection.
    pub fn with_controller<R>(&self, f: impl FnOnce(&StreamController<D>) -> R) -> R {
        f(&lock(&self.controller))
    }

    fn cancel_timer(&self) {
        self.replace_timer(None);
    }

    fn replace_timer(&self, timer: Option<CompletionTimer>) {
        let previous = {
            let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, timer)
        };
        drop(previous);
    }
}

impl<D: OutputDevice + 'static> Drop for AudioStreamer<D> {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

fn deliver(notification: Option<Notification>) {
    if let Some(notification) = notification {
        notification.deliver();
    }
}

/// Background ticker that runs the drain check until the stream completes.
///
/// Dropping the timer cancels it. The thread is never joined, so a timer may
/// be dropped from inside a completion callback running on its own thread.
struct CompletionTimer {
    _cancel: Sender<()>,
}

impl CompletionTimer {
    fn spawn<D: OutputDevice + 'static>(
        controller: Weak<Mutex<StreamController<D>>>,
        interval: Duration,
    ) -> Result<Self> {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);

        thread::Builder::new()
            .name("completion-monitor".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                debug!("Completion monitor started ({:?} interval)", interval);
                loop {
                    crossbeam::select! {
                        recv(cancel_rx) -> _ => {
                            debug!("Completion monitor cancelled");
                            break;
                        }
                        recv(ticker) -> _ => {
                            let Some(controller) = controller.upgrade() else {
                                break;
                            };
                            let (notification, state) = {
                                let mut controller = lock(&controller);
                                controller.check_completion();
                                (controller.take_notification(), controller.state())
                            };
                            if let Some(notification) = notification {
                                info!("Delivering completion: {:?}", notification.completion());
                                notification.deliver();
                                break;
                            }
                            if state != StreamState::Draining {
                                debug!("Completion monitor stopping in state {:?}", state);
                                break;
                            }
                        }
                    }
                }
            })?;

        Ok(Self { _cancel: cancel_tx })
    }
}
