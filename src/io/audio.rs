//! Audio device output using cpal.
//!
//! [`CpalOutput`] turns the "play this buffer at device time T" capability
//! into a real output stream. Scheduled buffers travel to the audio thread
//! over an SPSC ring. The audio thread counts rendered frames, and that
//! count is the device clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, DeviceId, SampleFormat, SizedSample, Stream, StreamConfig};
use dasp_sample::{FromSample, Sample as DaspSample};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info, warn};

use crate::audio::effects::{EffectChain, apply_chain};
use crate::audio::frame::PlaybackBuffer;
use crate::io::output::OutputDevice;

/// Buffers that may be committed ahead of the playhead (~20s at 320ms each).
/// Producers faster than real time must keep their schedule lead below this.
pub const SCHEDULE_QUEUE_CAPACITY: usize = 64;
const TARGET_DEVICE_BUFFER_FRAMES: u32 = 256;
/// Frames rendered per block when the host does not fix its buffer size.
const DEFAULT_RENDER_BLOCK_FRAMES: usize = 4096;

fn find_device_by_id<I: Iterator<Item = Device>>(
    devices: I,
    device_id: &DeviceId,
) -> Option<Device> {
    devices
        .filter_map(|d| d.id().ok().map(|id| (d, id)))
        .find(|(_, id)| id == device_id)
        .map(|(d, _)| d)
}

fn get_output_device(device_id: Option<&DeviceId>) -> Result<Device> {
    let host = cpal::default_host();
    match device_id {
        Some(id) => {
            let devices = host
                .output_devices()
                .context("Failed to enumerate output devices")?;
            find_device_by_id(devices, id).context("Output device not found")
        }
        None => host
            .default_output_device()
            .context("No default output device available"),
    }
}

struct ScheduledBuffer {
    start_frame: u64,
    buffer: PlaybackBuffer,
}

/// Audio-thread side: places scheduled buffers on the frame clock.
struct Renderer {
    consumer: Consumer<ScheduledBuffer>,
    current: Option<ScheduledBuffer>,
    position: usize,
    frames_played: Arc<AtomicU64>,
    channels: usize,
    effects: EffectChain,
    /// Mono mix of one block, allocated once up front.
    scratch: Vec<f32>,
}

impl Renderer {
    fn new(
        consumer: Consumer<ScheduledBuffer>,
        frames_played: Arc<AtomicU64>,
        channels: usize,
        effects: EffectChain,
        block_frames: usize,
    ) -> Self {
        Self {
            consumer,
            current: None,
            position: 0,
            frames_played,
            channels: channels.max(1),
            effects,
            scratch: vec![0.0; block_frames.max(1)],
        }
    }

    /// Fill a device callback buffer. Large callbacks are split into blocks
    /// that fit `scratch`, so nothing is allocated here.
    fn render<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        let block_len = self.scratch.len() * self.channels;
        for block in data.chunks_mut(block_len) {
            self.render_block(block);
        }
    }

    fn render_block<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        let frames = data.len() / self.channels;
        let clock = self.frames_played.load(Ordering::Acquire);

        for offset in 0..frames {
            self.scratch[offset] = self.next_sample(clock + offset as u64);
        }
        apply_chain(&mut self.effects, &mut self.scratch[..frames]);

        // mono fans out to every device channel
        for (frame, &value) in data.chunks_mut(self.channels).zip(&self.scratch[..frames]) {
            let value = T::from_sample(value);
            for slot in frame {
                *slot = value;
            }
        }

        self.frames_played
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Silence until the next buffer's start frame; a buffer whose start has
    /// already passed plays immediately.
    fn next_sample(&mut self, frame: u64) -> f32 {
        loop {
            let Some(current) = &self.current else {
                match self.consumer.pop() {
                    Ok(next) => {
                        self.current = Some(next);
                        self.position = 0;
                        continue;
                    }
                    Err(_) => return 0.0,
                }
            };

            if self.position == 0 && frame < current.start_frame {
                return 0.0;
            }
            if let Some(&sample) = current.buffer.data().get(self.position) {
                self.position += 1;
                return sample;
            }
            self.current = None;
        }
    }
}

/// Plays scheduled buffers on a cpal output device.
///
/// The stream is opened at the streamer's sample rate. Mono buffers are
/// duplicated onto every device channel and converted to the device's
/// sample format.
pub struct CpalOutput {
    producer: Producer<ScheduledBuffer>,
    frames_played: Arc<AtomicU64>,
    device_error: Arc<AtomicBool>,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open and start an output stream.
    ///
    /// The returned [`Stream`] must be kept alive for as long as audio should
    /// play; dropping it stops the device.
    pub fn start(
        sample_rate: u32,
        device_id: Option<&DeviceId>,
        effects: EffectChain,
    ) -> Result<(Self, Stream)> {
        let output_device = get_output_device(device_id)?;
        let output_config = output_device
            .default_output_config()
            .context("Failed to query default output config")?;
        debug!("Output config: {output_config:#?}");

        let config = StreamConfig {
            channels: output_config.channels(),
            sample_rate,
            buffer_size: match output_config.buffer_size() {
                cpal::SupportedBufferSize::Range { min, max } => {
                    let size = TARGET_DEVICE_BUFFER_FRAMES.clamp(*min, *max);
                    debug!(
                        "Using output buffer size: {} (min={}, max={})",
                        size, min, max
                    );
                    BufferSize::Fixed(size)
                }
                cpal::SupportedBufferSize::Unknown => {
                    warn!("Supported buffer size range unknown, using default");
                    BufferSize::Default
                }
            },
        };

        let block_frames = match config.buffer_size {
            BufferSize::Fixed(size) => size as usize,
            BufferSize::Default => DEFAULT_RENDER_BLOCK_FRAMES,
        };
        let (producer, consumer) = RingBuffer::new(SCHEDULE_QUEUE_CAPACITY);
        let frames_played = Arc::new(AtomicU64::new(0));
        let device_error = Arc::new(AtomicBool::new(false));
        let renderer = Renderer::new(
            consumer,
            frames_played.clone(),
            config.channels as usize,
            effects,
            block_frames,
        );

        let stream = match output_config.sample_format() {
            SampleFormat::F32 => {
                build_output_stream::<f32>(&output_device, &config, renderer, device_error.clone())?
            }
            SampleFormat::I16 => {
                build_output_stream::<i16>(&output_device, &config, renderer, device_error.clone())?
            }
            SampleFormat::U16 => {
                build_output_stream::<u16>(&output_device, &config, renderer, device_error.clone())?
            }
            format => bail!("Unsupported sample format: {format:?}"),
        };
        stream.play().context("Failed to start output stream")?;
        info!(
            "Audio output started at {} Hz, {} channel(s)",
            sample_rate, config.channels
        );

        Ok((
            Self {
                producer,
                frames_played,
                device_error,
                sample_rate,
            },
            stream,
        ))
    }
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: Renderer,
    device_error: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    debug!("Building output stream");
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
            move |err| {
                error!("An error occurred on the output audio stream: {}", err);
                device_error.store(true, Ordering::Release);
            },
            None,
        )
        .context("Failed to build output stream")?;
    Ok(stream)
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn schedule_buffer(&mut self, buffer: PlaybackBuffer, start_time: f64) -> Result<()> {
        if self.device_error.load(Ordering::Acquire) {
            bail!("Output stream reported an error and is no longer playing");
        }
        if buffer.sample_rate() != self.sample_rate {
            bail!(
                "Buffer sample rate {} Hz does not match output stream rate {} Hz",
                buffer.sample_rate(),
                self.sample_rate
            );
        }

        let start_frame = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.producer
            .push(ScheduledBuffer {
                start_frame,
                buffer,
            })
            .map_err(|_| {
                anyhow!(
                    "Output schedule queue full ({} buffers pending)",
                    SCHEDULE_QUEUE_CAPACITY
                )
            })
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn is_available(&self) -> bool {
        !self.device_error.load(Ordering::Acquire)
    }
}
