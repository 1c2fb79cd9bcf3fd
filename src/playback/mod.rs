//! Scheduling, completion tracking, and the streaming entry point.
//!
//! - [`PlaybackScheduler`] - Places buffers back to back on the device clock
//! - [`CompletionMonitor`] - Fires the completion notification exactly once
//! - [`StreamController`] - Single-threaded stream lifecycle
//! - [`AudioStreamer`] - Thread-safe handle with a periodic completion timer

pub mod controller;
pub mod monitor;
pub mod scheduler;
pub mod streamer;

pub use controller::{StreamController, StreamState};
pub use monitor::{Completion, CompletionCallback, CompletionMonitor, Notification};
pub use scheduler::{PlaybackScheduler, SchedulerState};
pub use streamer::AudioStreamer;
