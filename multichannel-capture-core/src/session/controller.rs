use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::audio_models::{StreamParameters, StreamRequest};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::{CaptureReport, ChannelReport};
use crate::models::state::CaptureState;
use crate::processing::transfer_queue::{
    create_transfer_queue, ChannelConsumer, QueueHandle, QueueProducer,
};
use crate::session::device_session::DeviceSession;
use crate::session::drain_latch::DrainLatch;
use crate::session::error_signal::ErrorSignal;
use crate::storage::channel_writer::{spawn_writer, ChannelWriter};
use crate::storage::metadata;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_device::CaptureDevice;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// External request to end a run. Cheap to clone and safe to set from any
/// thread or signal-forwarding task.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

struct WriterThread {
    channel: u16,
    file_path: PathBuf,
    handle: thread::JoinHandle<ChannelWriter>,
}

/// Queue pieces built at open and handed out at start.
struct PendingStream {
    producer: QueueProducer,
    consumers: Vec<ChannelConsumer>,
}

/// Drives one capture run through its lifecycle.
///
/// ```text
/// [Device] → callback → demux → [TransferQueue] ─┬→ [channel-writer-0] → channel_0.raw
///                                                 ├→ [channel-writer-1] → channel_1.raw
///                                                 └→ ...
/// ```
///
/// `open` creates every sink and negotiates the stream, `start` spawns the
/// writers and starts the device, and `stop` halts the device, drains every
/// queued slice, closes the sinks, and returns the run's report. Sinks are
/// never closed before their writer has drained.
pub struct CaptureController<D: CaptureDevice> {
    config: CaptureConfiguration,
    session: DeviceSession<D>,
    signal: Arc<ErrorSignal>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    writers: Vec<ChannelWriter>,
    pending: Option<PendingStream>,
    queue: Option<QueueHandle>,
    latch: Option<Arc<DrainLatch>>,
    threads: Vec<WriterThread>,
    report: Option<CaptureReport>,
}

impl<D: CaptureDevice> CaptureController<D> {
    pub fn new(device: D, config: CaptureConfiguration) -> Self {
        let signal = Arc::new(ErrorSignal::new());
        Self {
            config,
            session: DeviceSession::new(device, Arc::clone(&signal)),
            signal,
            delegate: None,
            writers: Vec::new(),
            pending: None,
            queue: None,
            latch: None,
            threads: Vec::new(),
            report: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.session.state().clone()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn parameters(&self) -> Option<&StreamParameters> {
        self.session.parameters()
    }

    /// Queue statistics, available from `open` on.
    pub fn queue(&self) -> Option<&QueueHandle> {
        self.queue.as_ref()
    }

    /// Report from the last completed run.
    pub fn report(&self) -> Option<&CaptureReport> {
        self.report.as_ref()
    }

    pub fn device(&self) -> &D {
        self.session.device()
    }

    /// Validate configuration, create every sink, and open the device.
    /// Transitions: uninitialized → opened, or → failed with no sink files
    /// left behind.
    pub fn open(&mut self) -> Result<StreamParameters, CaptureError> {
        if *self.session.state() != CaptureState::Uninitialized {
            return Err(CaptureError::InvalidState(format!(
                "open requires uninitialized, controller is {}",
                self.session.state().name()
            )));
        }

        if let Err(reason) = self.config.validate() {
            return Err(self.abort_startup(CaptureError::ConfigurationFailed(reason)));
        }

        if let Err(e) = fs::create_dir_all(&self.config.output_directory) {
            return Err(self.abort_startup(CaptureError::StorageError(format!(
                "failed to create output directory {}: {}",
                self.config.output_directory.display(),
                e
            ))));
        }

        let batch_bytes = self.config.slice_bytes() * self.config.write_batch_periods;
        for channel in 0..self.config.channels {
            let mut writer = ChannelWriter::new(channel, self.config.channel_path(channel), batch_bytes)
                .overwrite_existing(self.config.overwrite_existing);
            if let Err(err) = writer.open() {
                return Err(self.abort_startup(err));
            }
            self.writers.push(writer);
        }

        let request = StreamRequest::from(&self.config);
        let parameters = match self.session.open(&request) {
            Ok(parameters) => parameters,
            Err(err) => return Err(self.abort_startup(err)),
        };

        let (producer, consumers, queue) = create_transfer_queue(
            parameters.channels,
            parameters.frames_per_period as usize,
            self.config.queue_capacity_periods,
        );
        self.pending = Some(PendingStream { producer, consumers });
        self.queue = Some(queue);

        log::info!(
            "Opened '{}': {} Hz, {} channels, {} frames/period, queue {} periods",
            parameters.device.name,
            parameters.sample_rate,
            parameters.channels,
            parameters.frames_per_period,
            self.config.queue_capacity_periods
        );
        self.notify_state();
        Ok(parameters)
    }

    /// Spawn one writer per channel, then start the device.
    /// Transitions: opened → running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.start_with(spawn_writer)
    }

    fn start_with<S>(&mut self, mut spawn: S) -> Result<(), CaptureError>
    where
        S: FnMut(
            ChannelWriter,
            ChannelConsumer,
            Arc<DrainLatch>,
            Arc<ErrorSignal>,
        ) -> Result<thread::JoinHandle<ChannelWriter>, CaptureError>,
    {
        if *self.session.state() != CaptureState::Opened {
            return Err(CaptureError::InvalidState(format!(
                "start requires opened, controller is {}",
                self.session.state().name()
            )));
        }
        let Some(PendingStream { producer, consumers }) = self.pending.take() else {
            return Err(CaptureError::InvalidState("transfer queue was not built".into()));
        };

        let latch = Arc::new(DrainLatch::new(consumers.len()));
        self.latch = Some(Arc::clone(&latch));

        let writers = std::mem::take(&mut self.writers);
        let mut pairs = writers.into_iter().zip(consumers);
        while let Some((writer, consumer)) = pairs.next() {
            let channel = writer.channel();
            let file_path = writer.file_path().to_path_buf();
            match spawn(writer, consumer, Arc::clone(&latch), Arc::clone(&self.signal)) {
                Ok(handle) => self.threads.push(WriterThread {
                    channel,
                    file_path,
                    handle,
                }),
                Err(err) => {
                    // The unspawned writer was dropped with its empty file.
                    if let Err(e) = fs::remove_file(&file_path) {
                        log::warn!("failed to remove {}: {}", file_path.display(), e);
                    }
                    self.writers.extend(pairs.map(|(writer, _)| writer));
                    self.reclaim_writers();
                    return Err(self.abort_startup(err));
                }
            }
        }

        if let Err(err) = self.session.start(producer) {
            self.reclaim_writers();
            return Err(self.abort_startup(err));
        }

        log::info!("Capture running with {} channel writers", self.threads.len());
        self.notify_state();
        Ok(())
    }

    /// Block until `stop` is requested or the stream fails, then run the
    /// stop sequence.
    pub fn run_until_stopped(&mut self, stop: &StopSignal) -> Result<CaptureReport, CaptureError> {
        while self.session.state().is_running() && !stop.is_requested() && !self.signal.is_fatal() {
            thread::sleep(POLL_INTERVAL);
        }
        if self.signal.is_fatal() {
            log::warn!("Stream failed, stopping capture");
        } else {
            log::info!("Stop requested");
        }
        self.stop()
    }

    /// Halt the device, drain every writer, close the sinks, and report.
    ///
    /// Transitions: running → stopping → drained → closed. If the stream
    /// failed while running, the same sequence runs and ends in
    /// `Failed(StreamFatal)`; the report is still returned.
    pub fn stop(&mut self) -> Result<CaptureReport, CaptureError> {
        if !self.session.state().is_running() {
            return Err(CaptureError::InvalidState(format!(
                "stop requires running, controller is {}",
                self.session.state().name()
            )));
        }

        let stop_result = self.session.stop();
        self.notify_state();
        if let Err(err) = stop_result {
            log::error!("Device stop failed: {}", err);
            self.notify_error(&err);
        }
        if let Some(ref queue) = self.queue {
            queue.close();
        }

        let fatal = self.signal.to_error();
        if let Some(ref err) = fatal {
            log::error!("{}", err);
            self.notify_error(err);
        }

        let drained = match self.latch {
            Some(ref latch) => latch.wait(self.config.drain_timeout),
            None => true,
        };
        if !drained {
            log::warn!(
                "Drain timed out after {:?}; abandoning stalled writers",
                self.config.drain_timeout.unwrap_or_default()
            );
        }
        self.session.transition(CaptureState::Drained)?;
        self.notify_state();

        let channels = self.close_writers(drained);

        if let Some(ref err) = fatal {
            self.session.fail(err.clone());
        }
        if let Err(err) = self.session.close() {
            log::error!("Device close failed: {}", err);
            self.notify_error(&err);
        }

        let Some(parameters) = self.session.parameters().cloned() else {
            return Err(CaptureError::InvalidState("no negotiated parameters".into()));
        };
        let periods = self.queue.as_ref().map_or(0, QueueHandle::periods);
        let report = CaptureReport::new(
            parameters,
            periods,
            fatal.as_ref().map(ToString::to_string),
            channels,
        );

        let dropped = report.total_dropped();
        if dropped > 0 {
            log::warn!("{} slice(s) dropped on queue overflow", dropped);
        }
        if self.config.write_report {
            let path = self.config.report_path();
            match metadata::write_report(&report, &path) {
                Ok(()) => log::debug!("Wrote report {}", path.display()),
                Err(err) => {
                    log::error!("{}", err);
                    self.notify_error(&err);
                }
            }
        }

        log::info!(
            "Capture {}: {} periods ({:.3} s), {} bytes across {} channels",
            self.session.state().name(),
            report.periods_captured,
            report.duration_secs,
            report.total_bytes(),
            report.channels.len()
        );
        self.notify_state();
        if let Some(ref delegate) = self.delegate {
            delegate.on_capture_finished(&report);
        }
        self.report = Some(report.clone());
        Ok(report)
    }

    // --- Internal helpers ---

    /// Join every writer thread and close its sink. Writers still running
    /// after a drain timeout are abandoned and reported as failed.
    fn close_writers(&mut self, drained: bool) -> Vec<ChannelReport> {
        let mut reports = Vec::with_capacity(self.threads.len());
        for worker in std::mem::take(&mut self.threads) {
            let dropped = self
                .queue
                .as_ref()
                .map_or(0, |queue| queue.dropped(worker.channel));

            if !drained && !worker.handle.is_finished() {
                let mut stub = ChannelWriter::new(worker.channel, worker.file_path, 0);
                let err = stub.fail("writer did not drain before the timeout");
                log::error!("{}", err);
                self.notify_error(&err);
                reports.push(stub.report(dropped));
                continue;
            }

            let mut writer = match worker.handle.join() {
                Ok(writer) => writer,
                Err(_) => {
                    let mut stub = ChannelWriter::new(worker.channel, worker.file_path, 0);
                    stub.fail("writer thread panicked");
                    stub
                }
            };
            match writer.close() {
                Ok(_) => {}
                Err(err) => {
                    log::error!("{}", err);
                    self.notify_error(&err);
                }
            }
            let report = writer.report(dropped);
            if report.gap_events > 0 {
                log::warn!(
                    "Channel {}: {} gap(s), {} slice(s) missing",
                    report.channel,
                    report.gap_events,
                    report.missing_slices
                );
            }
            reports.push(report);
        }
        reports
    }

    /// After a startup failure inside `start`, stop the writer threads and
    /// take their writers back so their files can be removed.
    fn reclaim_writers(&mut self) {
        if let Some(ref queue) = self.queue {
            queue.close();
        }
        for worker in std::mem::take(&mut self.threads) {
            match worker.handle.join() {
                Ok(writer) => self.writers.push(writer),
                Err(_) => log::error!("Channel {} writer panicked during startup", worker.channel),
            }
        }
    }

    /// Fail the run, remove any sinks created so far, and notify.
    fn abort_startup(&mut self, err: CaptureError) -> CaptureError {
        log::error!("Capture startup failed: {}", err);
        self.pending = None;
        if let Some(ref queue) = self.queue {
            queue.close();
        }
        for mut writer in std::mem::take(&mut self.writers) {
            if let Err(cleanup) = writer.discard_file() {
                log::warn!("{}", cleanup);
            }
        }
        self.session.fail(err.clone());
        if self.session.parameters().is_some() {
            if let Err(close) = self.session.close() {
                log::warn!("Device close after failed startup: {}", close);
            }
        }
        self.notify_error(&err);
        self.notify_state();
        err
    }

    fn notify_state(&self) {
        let state = self.session.state();
        log::info!("Capture state: {}", state.name());
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn notify_error(&self, err: &CaptureError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(err);
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureController<D> {
    fn drop(&mut self) {
        if self.session.state().is_running() {
            log::warn!("Capture controller dropped while running; stopping device");
            let _ = self.session.stop();
            if let Some(ref queue) = self.queue {
                queue.close();
            }
        }
    }
}
