//! Record every channel of an input device to its own raw f32 file.
//!
//! ```text
//! record-multichannel --channels 8 --output-dir take1 --duration 60
//! ```
//!
//! Press Enter, Ctrl-C or send SIGTERM to stop early; a second signal exits
//! without draining. The exit status is 0 only for a clean run; dropped
//! slices are reported as warnings.

use std::future::Future;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use multichannel_capture_core::{
    CaptureConfiguration, CaptureController, CaptureError, CaptureReport, DeviceSelector, StopSignal,
};
use multichannel_capture_cpal::{CpalInputDevice, DeviceEnumerator};

#[derive(Parser, Debug)]
#[command(name = "record-multichannel")]
#[command(version, about = "Capture a multichannel input device to one raw file per channel", long_about = None)]
struct Cli {
    /// Sample rate in Hz
    #[arg(long, default_value_t = 44_100, env = "RECORD_SAMPLE_RATE")]
    sample_rate: u32,

    /// Number of input channels to capture
    #[arg(short, long, default_value_t = 4, env = "RECORD_CHANNELS")]
    channels: u16,

    /// Frames per callback period
    #[arg(long, default_value_t = 256)]
    frames_per_period: u32,

    /// Input device: "default", a device index, or an exact device name
    #[arg(short, long, default_value = "default", env = "RECORD_DEVICE")]
    device: DeviceSelector,

    /// Directory for the channel files (created if missing)
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Channel file name prefix
    #[arg(long, default_value = "channel_")]
    prefix: String,

    /// Periods each channel may queue before new ones are dropped
    #[arg(long, default_value_t = 256)]
    queue_periods: usize,

    /// Periods buffered per channel between writes
    #[arg(long, default_value_t = 16)]
    batch_periods: usize,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Seconds to wait for writers to drain on stop (0 waits indefinitely)
    #[arg(long, default_value_t = 30.0)]
    drain_timeout: f64,

    /// Skip the JSON report sidecar
    #[arg(long)]
    no_report: bool,

    /// Replace channel files left by an earlier run
    #[arg(long)]
    overwrite: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    fn to_config(&self) -> CaptureConfiguration {
        CaptureConfiguration {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames_per_period: self.frames_per_period,
            device: self.device.clone(),
            output_directory: self.output_dir.clone(),
            file_prefix: self.prefix.clone(),
            queue_capacity_periods: self.queue_periods,
            write_batch_periods: self.batch_periods,
            drain_timeout: positive_secs(self.drain_timeout),
            write_report: !self.no_report,
            overwrite_existing: self.overwrite,
            ..Default::default()
        }
    }
}

/// Seconds as a duration; zero, negative and unrepresentable values mean no
/// limit.
fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    match record(cli.to_config(), cli.duration.and_then(positive_secs)) {
        Ok(report) => {
            summarize(&report);
            exit_code(report.exit_code())
        }
        Err(err) => {
            log::error!("{}", err);
            exit_code(err.exit_code())
        }
    }
}

fn list_devices() -> ExitCode {
    let enumerator = DeviceEnumerator::new();
    match enumerator.list_input_devices() {
        Ok(devices) => {
            println!("Input devices on {}:", enumerator.host_name());
            for (index, device) in devices.iter().enumerate() {
                let channels = device
                    .max_input_channels
                    .map_or_else(|| "?".to_string(), |c| c.to_string());
                let marker = if device.is_default { " (default)" } else { "" };
                println!("  [{}] {} - up to {} channels{}", index, device.name, channels, marker);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            exit_code(err.exit_code())
        }
    }
}

fn record(config: CaptureConfiguration, duration: Option<Duration>) -> Result<CaptureReport, CaptureError> {
    let stop = StopSignal::new();
    watch_signals(stop.clone());

    let device = CpalInputDevice::new(DeviceEnumerator::new());
    let mut controller = CaptureController::new(device, config);
    controller.open()?;
    controller.start()?;

    watch_stdin(stop.clone(), duration.is_some());
    if let Some(duration) = duration {
        let timer = stop.clone();
        let spawned = thread::Builder::new()
            .name("duration-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                timer.request_stop();
            });
        if let Err(e) = spawned {
            log::warn!("Failed to start duration timer: {}", e);
        }
        log::info!("Recording for {:.1} s; press Enter to stop early", duration.as_secs_f64());
    } else {
        log::info!("Recording; press Enter to stop");
    }

    controller.run_until_stopped(&stop)
}

/// Request a stop when a line arrives on stdin. At end of input the stop is
/// requested only if nothing else will end the run.
fn watch_stdin(stop: StopSignal, has_deadline: bool) {
    let spawned = thread::Builder::new()
        .name("stdin-stop".into())
        .spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) if has_deadline => {}
                Ok(_) => stop.request_stop(),
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    if !has_deadline {
                        stop.request_stop();
                    }
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to watch stdin: {}", e);
    }
}

/// Resolves on the next SIGINT or SIGTERM with the signal's name.
async fn termination_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
    }
}

/// Wait for `signal` and turn it into a stop request. Returns whether a
/// signal arrived.
async fn forward_signal<F>(signal: F, stop: &StopSignal) -> bool
where
    F: Future<Output = io::Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            log::info!("Received {}, stopping capture", name);
            stop.request_stop();
            true
        }
        Err(e) => {
            log::warn!("Failed to listen for termination signals: {}", e);
            false
        }
    }
}

/// Route SIGINT/SIGTERM to `stop` so the run drains and closes. A second
/// signal while draining exits immediately.
fn watch_signals(stop: StopSignal) {
    let spawned = thread::Builder::new()
        .name("signal-stop".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::warn!("Failed to start signal runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if !forward_signal(termination_signal(), &stop).await {
                    return;
                }
                if let Ok(name) = termination_signal().await {
                    log::warn!("Received {} again, exiting without draining", name);
                    std::process::exit(130);
                }
            });
        });
    if let Err(e) = spawned {
        log::warn!("Failed to watch termination signals: {}", e);
    }
}

fn summarize(report: &CaptureReport) {
    for channel in &report.channels {
        match channel.error {
            Some(ref error) => log::error!("{}: {}", channel.file_path.display(), error),
            None => log::info!(
                "{}: {} bytes, {} dropped, {} gap(s)",
                channel.file_path.display(),
                channel.bytes_written,
                channel.slices_dropped,
                channel.gap_events
            ),
        }
    }
    if let Some(ref error) = report.stream_error {
        log::error!("Stream failed: {}", error);
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
