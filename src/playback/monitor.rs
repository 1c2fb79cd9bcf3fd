//! At-most-once completion detection.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

/// How a streaming session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// End-of-stream was signalled and the last scheduled buffer has played.
    Finished,
    /// The output device rejected a buffer and the session was abandoned.
    Failed { reason: String },
}

/// Single-subscriber completion callback.
pub type CompletionCallback = Arc<dyn Fn(Completion) + Send + Sync>;

/// A completion waiting to be delivered.
///
/// Taken out of the monitor while the owner holds its state, and delivered
/// afterwards so the callback can freely call back into the streamer.
pub struct Notification {
    completion: Completion,
    callback: Option<CompletionCallback>,
}

impl Notification {
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Invoke the registered callback, if any.
    pub fn deliver(self) {
        match self.callback {
            Some(callback) => callback(self.completion),
            None => debug!("No completion callback registered for {:?}", self.completion),
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("completion", &self.completion)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Watches for the drained-and-played condition and fires once per session.
#[derive(Default)]
pub struct CompletionMonitor {
    callback: Option<CompletionCallback>,
    fired: bool,
    pending: Option<Completion>,
}

impl CompletionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback, replacing any previous one.
    pub fn set_callback(&mut self, callback: CompletionCallback) {
        self.callback = Some(callback);
    }

    /// One periodic check. Returns `true` only on the call that detects
    /// completion; every later call returns `false` until [`reset`](Self::reset).
    ///
    /// A stream that never scheduled anything has no end time and completes
    /// as soon as it is drained.
    pub fn observe(
        &mut self,
        end_of_stream: bool,
        queue_empty: bool,
        now: f64,
        stream_end_time: Option<f64>,
    ) -> bool {
        if self.fired || !end_of_stream || !queue_empty {
            return false;
        }
        if let Some(end) = stream_end_time {
            if now < end {
                return false;
            }
        }

        info!("Stream completed at device time {:.4}s", now);
        self.fire(Completion::Finished);
        true
    }

    /// Record a failure completion. Returns `false` if the session already
    /// completed.
    pub fn fail(&mut self, reason: String) -> bool {
        if self.fired {
            return false;
        }
        self.fire(Completion::Failed { reason });
        true
    }

    fn fire(&mut self, completion: Completion) {
        self.fired = true;
        self.pending = Some(completion);
    }

    pub fn take_notification(&mut self) -> Option<Notification> {
        self.pending.take().map(|completion| Notification {
            completion,
            callback: self.callback.clone(),
        })
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Re-arm for a new session. The callback stays registered.
    pub fn reset(&mut self) {
        self.fired = false;
        self.pending = None;
    }
}
