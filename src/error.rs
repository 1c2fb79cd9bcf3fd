//! Error types for the streaming core.
//!
//! Decode-level variants are reported through logging and never interrupt a
//! stream. Device-level variants end the current session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Data arrived before `initialize`.
    #[error("Streamer not initialized, call initialize() first")]
    NotInitialized,

    /// Chunk with an odd number of bytes. The trailing byte is dropped.
    #[error("Malformed PCM16 chunk: {len} bytes is not a multiple of 2")]
    MalformedChunk { len: usize },

    /// A single sample could not be read. Only that sample is skipped.
    #[error("Failed to decode PCM16 sample at index {index}")]
    SampleDecode { index: usize },

    /// Configuration change attempted while a stream is in flight.
    #[error("Configuration misuse: {0}")]
    ConfigurationMisuse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output device rejected a buffer.
    #[error("Scheduling failure: {0}")]
    Scheduling(String),

    /// The completion timer thread could not be started.
    #[error("Completion monitor error: {0}")]
    Monitor(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
