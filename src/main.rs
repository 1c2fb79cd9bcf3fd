use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use pcm_streamer::audio::effects::{EffectChain, Gain, GainControl};
use pcm_streamer::io::audio::SCHEDULE_QUEUE_CAPACITY;
use pcm_streamer::{
    AudioStreamer, Completion, CpalOutput, OutputDevice, StreamerConfig, VirtualOutput,
};

/// Upper bound on audio committed ahead of the device clock.
const MAX_SCHEDULE_LEAD_SECS: f64 = 5.0;

/// Play raw 16-bit little-endian mono PCM from stdin or TCP.
#[derive(Parser, Debug)]
#[command(name = "pcm-streamer", version, about)]
struct Args {
    /// JSON file with a streamer configuration; flags override its values
    #[arg(long, env = "PCM_STREAMER_CONFIG")]
    config: Option<PathBuf>,

    /// Sample rate of the incoming PCM in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Duration of each scheduled buffer in milliseconds
    #[arg(long)]
    buffer_ms: Option<u32>,

    /// Delay before the first buffer of a session starts, in milliseconds
    #[arg(long)]
    initial_delay_ms: Option<u32>,

    /// Output volume multiplier
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Accept one PCM session per TCP connection instead of reading stdin
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Bytes requested per read from the input
    #[arg(long, default_value_t = 4096)]
    read_size: usize,

    /// Schedule against a wall-clock virtual device instead of the speakers
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Args::parse()) {
        error!("Application error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    config.validate()?;
    info!("Starting pcm-streamer with {config:?}");

    // cpal streams are not Send, so the runtime is driven from this thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    if args.dry_run {
        info!("Dry run: scheduling against a virtual output");
        let streamer = AudioStreamer::new(VirtualOutput::realtime());
        runtime.block_on(serve(streamer, config, &args))
    } else {
        let volume = GainControl::new(args.volume);
        let effects: EffectChain = vec![Box::new(Gain::new(volume))];
        let (output, _stream) = CpalOutput::start(config.sample_rate_hz, None, effects)?;
        let streamer = AudioStreamer::new(output);
        runtime.block_on(serve(streamer, config, &args))
    }
}

fn load_config(args: &Args) -> Result<StreamerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => StreamerConfig::default(),
    };

    if let Some(rate) = args.sample_rate {
        config.sample_rate_hz = rate;
    }
    if let Some(millis) = args.buffer_ms {
        config.buffer_millis = millis;
    }
    if let Some(millis) = args.initial_delay_ms {
        config.initial_buffer_delay_secs = millis as f64 / 1000.0;
    }
    Ok(config)
}

async fn serve<D: OutputDevice + 'static>(
    streamer: AudioStreamer<D>,
    config: StreamerConfig,
    args: &Args,
) -> Result<()> {
    let streamer = Arc::new(streamer);
    streamer.initialize(config)?;

    let max_lead = max_schedule_lead(&streamer.config());
    let Some(addr) = args.listen else {
        play_session(&streamer, tokio::io::stdin(), args.read_size, max_lead).await?;
        return Ok(());
    };

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening for PCM sessions on {addr}");

    // one output device, so sessions play one after another
    loop {
        let (socket, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        info!("Session from {peer}");
        if let Err(e) = play_session(&streamer, socket, args.read_size, max_lead).await {
            error!("Session from {peer} failed: {e:#}");
        }
        if !streamer.device_available() {
            bail!("Output device is no longer available");
        }
    }
}

/// Keep the schedule lead well inside the output queue, so input read
/// faster than real time never overflows it.
fn max_schedule_lead(config: &StreamerConfig) -> Duration {
    let queue_secs = SCHEDULE_QUEUE_CAPACITY as f64 / 2.0 * config.buffer_duration_secs();
    Duration::from_secs_f64(queue_secs.min(MAX_SCHEDULE_LEAD_SECS))
}

/// Wait until less than `max_lead` of audio is scheduled ahead of the device.
async fn wait_for_headroom<D: OutputDevice + 'static>(
    streamer: &AudioStreamer<D>,
    max_lead: Duration,
) {
    while let Some(lead) = streamer.schedule_lead() {
        // a stopped device clock never frees headroom
        if !streamer.device_available() {
            break;
        }
        let excess = lead - max_lead.as_secs_f64();
        if excess <= 0.0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs_f64(excess)).await;
    }
}

async fn play_session<D, R>(
    streamer: &Arc<AudioStreamer<D>>,
    mut reader: R,
    read_size: usize,
    max_lead: Duration,
) -> Result<Completion>
where
    D: OutputDevice + 'static,
    R: AsyncRead + Unpin,
{
    streamer.reset();
    let session = streamer.session_id();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    streamer.on_complete(move |completion| {
        let _ = done_tx.send(completion);
    });

    let mut buf = vec![0u8; read_size.max(2)];
    let mut total = 0usize;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .context("Failed to read PCM input")?;
        if n == 0 {
            break;
        }
        total += n;
        wait_for_headroom(streamer, max_lead).await;
        streamer.add_chunk(&buf[..n])?;
    }

    info!(%session, bytes = total, "Input finished, draining");
    streamer.signal_end_of_stream()?;

    let completion = done_rx
        .recv()
        .await
        .context("Completion callback was dropped before firing")?;
    match &completion {
        Completion::Finished => info!(%session, "Playback finished"),
        Completion::Failed { reason } => warn!(%session, "Playback failed: {reason}"),
    }
    Ok(completion)
}
