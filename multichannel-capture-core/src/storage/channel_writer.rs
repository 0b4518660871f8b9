use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use sha2::{Digest, Sha256};

use crate::models::audio_models::ChannelSlice;
use crate::models::error::CaptureError;
use crate::models::recording_result::ChannelReport;
use crate::processing::raw_format;
use crate::processing::transfer_queue::ChannelConsumer;
use crate::session::drain_latch::{DrainGuard, DrainLatch};
use crate::session::error_signal::ErrorSignal;

/// What happened to one slice handed to `write_slice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Sequence was not after the last one written; nothing was appended.
    Rejected,
}

#[derive(Debug, Default, Clone, Copy)]
struct WriterStats {
    bytes_written: u64,
    slices_written: u64,
    slices_discarded: u64,
    gap_events: u64,
    missing_slices: u64,
    rejected_slices: u64,
    last_sequence: Option<u64>,
}

/// Append-only raw sink for one channel.
///
/// ## File Format
///
/// ```text
/// [slice n samples, f32 LE][slice n+1 samples, f32 LE]...
/// ```
///
/// Slices are appended strictly in increasing sequence order. A forward jump
/// is recorded as a gap; a repeated or older sequence is refused. The first
/// I/O failure is kept and every later write returns it.
pub struct ChannelWriter {
    channel: u16,
    file_path: PathBuf,
    batch_bytes: usize,
    overwrite: bool,
    sink: Option<BufWriter<File>>,
    scratch: Vec<u8>,
    stats: WriterStats,
    error: Option<CaptureError>,
    checksum: Option<String>,
}

impl ChannelWriter {
    /// `batch_bytes` sizes the write buffer; bytes reach the file roughly that
    /// many at a time.
    pub fn new(channel: u16, file_path: PathBuf, batch_bytes: usize) -> Self {
        Self {
            channel,
            file_path,
            batch_bytes: batch_bytes.max(raw_format::BYTES_PER_SAMPLE),
            overwrite: false,
            sink: None,
            scratch: Vec::new(),
            stats: WriterStats::default(),
            error: None,
            checksum: None,
        }
    }

    /// Allow `open` to truncate a file that already exists.
    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Create the sink file, creating parent directories. An existing file is
    /// refused unless overwriting was allowed.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if self.sink.is_some() {
            return Err(CaptureError::InvalidState(format!(
                "channel {} sink is already open",
                self.channel
            )));
        }

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CaptureError::sink(self.channel, format!("failed to create directory: {}", e))
                })?;
            }
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if self.overwrite {
            if self.file_path.is_file() {
                log::warn!("Overwriting existing {}", self.file_path.display());
            }
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&self.file_path).map_err(|e| {
            let reason = if e.kind() == io::ErrorKind::AlreadyExists {
                format!("{} already exists", self.file_path.display())
            } else {
                format!("failed to create {}: {}", self.file_path.display(), e)
            };
            CaptureError::sink(self.channel, reason)
        })?;
        self.sink = Some(BufWriter::with_capacity(self.batch_bytes, file));
        log::debug!(
            "Opened channel {} sink {}",
            self.channel,
            self.file_path.display()
        );
        Ok(())
    }

    /// Append one slice's samples.
    pub fn write_slice(&mut self, slice: &ChannelSlice) -> Result<WriteOutcome, CaptureError> {
        if let Some(ref err) = self.error {
            return Err(err.clone());
        }
        if self.sink.is_none() {
            return Err(CaptureError::sink(self.channel, "sink is not open"));
        }

        if let Some(last) = self.stats.last_sequence {
            if slice.sequence <= last {
                self.stats.rejected_slices += 1;
                log::warn!(
                    "Channel {}: refusing slice {} (last written {})",
                    self.channel,
                    slice.sequence,
                    last
                );
                return Ok(WriteOutcome::Rejected);
            }
        }

        let expected = self.stats.last_sequence.map_or(0, |last| last + 1);
        if slice.sequence > expected {
            let missing = slice.sequence - expected;
            self.stats.gap_events += 1;
            self.stats.missing_slices += missing;
            log::warn!(
                "Channel {}: gap of {} slice(s) before sequence {}",
                self.channel,
                missing,
                slice.sequence
            );
        }

        self.scratch.clear();
        raw_format::encode_samples_le(slice.samples(), &mut self.scratch);
        self.write_raw()?;

        self.stats.slices_written += 1;
        self.stats.last_sequence = Some(slice.sequence);
        Ok(WriteOutcome::Written)
    }

    /// Push buffered bytes to the file.
    pub fn flush(&mut self) -> Result<(), CaptureError> {
        if let Some(ref err) = self.error {
            return Err(err.clone());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        if let Err(e) = sink.flush() {
            return Err(self.record(format!("flush failed: {}", e)));
        }
        Ok(())
    }

    /// Flush, sync and release the sink, then checksum the file.
    ///
    /// Returns the SHA-256 hex digest. A writer that already failed is still
    /// released, but its error is returned and no checksum is taken.
    pub fn close(&mut self) -> Result<String, CaptureError> {
        let Some(sink) = self.sink.take() else {
            return match (&self.error, &self.checksum) {
                (Some(err), _) => Err(err.clone()),
                (None, Some(checksum)) => Ok(checksum.clone()),
                (None, None) => Err(CaptureError::sink(self.channel, "sink was never opened")),
            };
        };

        if let Some(ref err) = self.error {
            // Best effort: keep whatever reached the buffer, ignore the result.
            let mut sink = sink;
            let _ = sink.flush();
            return Err(err.clone());
        }

        let file = match sink.into_inner() {
            Ok(file) => file,
            Err(e) => return Err(self.record(format!("flush failed: {}", e.error()))),
        };
        if let Err(e) = file.sync_all() {
            return Err(self.record(format!("sync failed: {}", e)));
        }
        drop(file);

        let checksum = sha256_file(&self.file_path)
            .map_err(|e| self.record(format!("failed to checksum file: {}", e)))?;
        log::debug!(
            "Closed channel {} sink: {} bytes, sha256 {}",
            self.channel,
            self.stats.bytes_written,
            checksum
        );
        self.checksum = Some(checksum.clone());
        Ok(checksum)
    }

    /// Record a failure from outside the writer (e.g. drain timeout).
    pub fn fail(&mut self, reason: impl Into<String>) -> CaptureError {
        self.record(reason.into())
    }

    /// Count queued slices that were consumed without being written.
    pub fn note_discarded(&mut self, count: u64) {
        self.stats.slices_discarded += count;
    }

    /// Release the sink and delete its file. Used when startup fails after
    /// sinks were created.
    pub fn discard_file(&mut self) -> Result<(), CaptureError> {
        self.sink = None;
        match fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::sink(
                self.channel,
                format!("failed to remove {}: {}", self.file_path.display(), e),
            )),
        }
    }

    /// Build this channel's report entry. `slices_dropped` comes from the
    /// transfer queue's counter.
    pub fn report(&self, slices_dropped: u64) -> ChannelReport {
        ChannelReport {
            channel: self.channel,
            file_path: self.file_path.clone(),
            bytes_written: self.stats.bytes_written,
            slices_written: self.stats.slices_written,
            slices_dropped,
            slices_discarded: self.stats.slices_discarded,
            gap_events: self.stats.gap_events,
            missing_slices: self.stats.missing_slices,
            rejected_slices: self.stats.rejected_slices,
            last_sequence: self.stats.last_sequence,
            checksum: self.checksum.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.stats.bytes_written
    }

    pub fn slices_written(&self) -> u64 {
        self.stats.slices_written
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.stats.last_sequence
    }

    pub fn gap_events(&self) -> u64 {
        self.stats.gap_events
    }

    pub fn missing_slices(&self) -> u64 {
        self.stats.missing_slices
    }

    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    fn write_raw(&mut self) -> Result<(), CaptureError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(CaptureError::sink(self.channel, "sink is not open"));
        };
        if let Err(e) = sink.write_all(&self.scratch) {
            return Err(self.record(format!("write failed: {}", e)));
        }
        self.stats.bytes_written += self.scratch.len() as u64;
        Ok(())
    }

    fn record(&mut self, reason: String) -> CaptureError {
        let err = CaptureError::sink(self.channel, reason);
        if self.error.is_none() {
            self.error = Some(err.clone());
        }
        err
    }
}

/// Writer thread body: persist slices until the lane reports end-of-stream.
///
/// After a sink failure the lane is still consumed so the controller's drain
/// completes; those slices are counted as discarded. The drain latch is
/// counted down on every exit path.
pub fn run_writer(
    mut writer: ChannelWriter,
    mut consumer: ChannelConsumer,
    latch: Arc<DrainLatch>,
    signal: Arc<ErrorSignal>,
) -> ChannelWriter {
    let _guard = DrainGuard::new(&latch);
    let mut halted = writer.error().is_some();

    while let Some(slice) = consumer.pop() {
        if halted {
            writer.note_discarded(1);
        } else if let Err(err) = writer.write_slice(&slice) {
            log::error!("Channel {} writer halted: {}", writer.channel(), err);
            signal.note_sink_failure();
            writer.note_discarded(1);
            halted = true;
        }
        consumer.recycle(slice.into_storage());
    }

    if !halted {
        if let Err(err) = writer.flush() {
            log::error!("Channel {} final flush failed: {}", writer.channel(), err);
            signal.note_sink_failure();
        }
    }
    log::debug!(
        "Channel {} writer drained: {} slices, last sequence {:?}",
        writer.channel(),
        writer.slices_written(),
        writer.last_sequence()
    );
    writer
}

/// Spawn `run_writer` on a thread named `channel-writer-<n>`.
pub fn spawn_writer(
    writer: ChannelWriter,
    consumer: ChannelConsumer,
    latch: Arc<DrainLatch>,
    signal: Arc<ErrorSignal>,
) -> Result<thread::JoinHandle<ChannelWriter>, CaptureError> {
    let channel = writer.channel();
    thread::Builder::new()
        .name(format!("channel-writer-{}", channel))
        .spawn(move || run_writer(writer, consumer, latch, signal))
        .map_err(|e| CaptureError::sink(channel, format!("failed to spawn writer thread: {}", e)))
}

/// SHA-256 hex digest of a file, read in chunks.
fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
