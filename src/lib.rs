//! Streaming playback of raw PCM16 audio.
//!
//! Chunks of 16-bit little-endian mono PCM arrive in arbitrary sizes, get
//! regrouped into fixed-duration buffers, and are scheduled gaplessly on an
//! output device clock. A completion callback fires once the final buffer
//! has finished playing.
//!
//! ```text
//! bytes -> Pcm16Decoder -> StreamReassembler -> PlaybackScheduler -> OutputDevice
//!                                                      |
//!                                              CompletionMonitor -> callback
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod playback;

pub use config::StreamerConfig;
pub use error::{Result, StreamError};
pub use io::{CpalOutput, OutputDevice, VirtualOutput};
pub use playback::{AudioStreamer, Completion, StreamState};
