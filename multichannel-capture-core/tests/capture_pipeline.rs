//! End-to-end runs of the capture pipeline against the mock device.

use std::fs;
use std::path::Path;
use std::time::Duration;

use multichannel_capture_core::devices::mock::{sample_value, MockDevice};
use multichannel_capture_core::processing::raw_format;
use multichannel_capture_core::storage::metadata;
use multichannel_capture_core::{CaptureConfiguration, CaptureController, CaptureError, CaptureState, StopSignal};

fn config(dir: &Path, channels: u16, frames: u32, queue_periods: usize) -> CaptureConfiguration {
    CaptureConfiguration {
        sample_rate: 44_100,
        channels,
        frames_per_period: frames,
        output_directory: dir.to_path_buf(),
        queue_capacity_periods: queue_periods,
        ..Default::default()
    }
}

fn read_channel(dir: &Path, channel: u16) -> Vec<f32> {
    let bytes = fs::read(dir.join(format!("channel_{}.raw", channel))).unwrap();
    raw_format::decode_samples_le(&bytes)
}

#[test]
fn hundred_periods_make_four_files_of_102400_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(4).with_periods(100);
    let progress = device.progress();

    let mut controller = CaptureController::new(device, config(dir.path(), 4, 256, 128));
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    let report = controller.stop().unwrap();

    assert_eq!(controller.state(), CaptureState::Closed);
    assert_eq!(report.periods_captured, 100);
    assert_eq!(report.total_dropped(), 0);
    assert_eq!(report.exit_code(), 0);
    for channel in 0..4u16 {
        let path = dir.path().join(format!("channel_{}.raw", channel));
        assert_eq!(fs::metadata(&path).unwrap().len(), 102_400);
        assert_eq!(report.channels[channel as usize].bytes_written, 102_400);
        assert_eq!(report.channels[channel as usize].slices_written, 100);
    }
}

#[test]
fn every_channel_holds_its_own_samples_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let frames = 64u32;
    let periods = 40u64;
    let device = MockDevice::new(3).with_periods(periods);
    let progress = device.progress();

    let mut controller = CaptureController::new(device, config(dir.path(), 3, frames, 64));
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    controller.stop().unwrap();

    for channel in 0..3u16 {
        let samples = read_channel(dir.path(), channel);
        let expected: Vec<f32> = (0..periods * frames as u64)
            .map(|frame| sample_value(frame, channel))
            .collect();
        assert_eq!(samples, expected, "channel {}", channel);
    }
}

#[test]
fn drain_reaches_last_queued_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(2).with_pace(Duration::from_micros(200));

    let mut controller = CaptureController::new(device, config(dir.path(), 2, 32, 16));
    controller.open().unwrap();
    controller.start().unwrap();
    std::thread::sleep(Duration::from_millis(40));
    let report = controller.stop().unwrap();

    let queue = controller.queue().unwrap();
    for channel in &report.channels {
        assert!(channel.last_sequence >= queue.last_queued(channel.channel));
        assert!(channel.last_sequence.is_some());
    }
}

#[test]
fn drops_match_gaps_and_written_slices() {
    let dir = tempfile::tempdir().unwrap();
    // A single pooled slice per channel makes overflow likely on a fast device.
    let device = MockDevice::new(2).with_periods(500);
    let progress = device.progress();

    let mut controller = CaptureController::new(device, config(dir.path(), 2, 8, 1));
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    let report = controller.stop().unwrap();

    assert_eq!(report.periods_captured, 500);
    for channel in &report.channels {
        assert_eq!(
            channel.slices_written + channel.slices_dropped,
            report.periods_captured,
            "channel {}",
            channel.channel
        );
        let last = channel.last_sequence.unwrap();
        let trailing = report.periods_captured - 1 - last;
        assert_eq!(channel.missing_slices + trailing, channel.slices_dropped);
        assert_eq!(channel.bytes_written, channel.slices_written * 8 * 4);
    }
    // Drops are warnings, not failures.
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn stream_fatal_drains_then_fails() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(2).disconnect_after(10);

    let mut controller = CaptureController::new(device, config(dir.path(), 2, 16, 32));
    controller.open().unwrap();
    controller.start().unwrap();
    let report = controller.run_until_stopped(&StopSignal::new()).unwrap();

    assert!(matches!(
        controller.state(),
        CaptureState::Failed(CaptureError::StreamFatal(_))
    ));
    assert!(report.stream_error.as_deref().unwrap().contains("disconnected"));
    assert_eq!(report.exit_code(), 5);
    for channel in 0..2u16 {
        assert_eq!(read_channel(dir.path(), channel).len(), 10 * 16);
    }
}

#[test]
fn report_sidecar_matches_returned_report() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(1).with_periods(3);
    let progress = device.progress();

    let cfg = config(dir.path(), 1, 16, 8);
    let report_path = cfg.report_path();
    let mut controller = CaptureController::new(device, cfg);
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    let report = controller.stop().unwrap();

    assert_eq!(metadata::read_report(&report_path).unwrap(), report);
    assert_eq!(report.channels[0].checksum.as_ref().map(String::len), Some(64));
}

#[test]
fn report_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(1).with_periods(1);
    let progress = device.progress();

    let mut cfg = config(dir.path(), 1, 16, 8);
    cfg.write_report = false;
    let report_path = cfg.report_path();
    let mut controller = CaptureController::new(device, cfg);
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    controller.stop().unwrap();

    assert!(!report_path.exists());
}

#[cfg(target_os = "linux")]
#[test]
fn failing_sink_halts_only_its_channel() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink("/dev/full", dir.path().join("channel_1.raw")).unwrap();

    let device = MockDevice::new(2).with_periods(50);
    let progress = device.progress();
    let mut cfg = config(dir.path(), 2, 64, 64);
    cfg.write_batch_periods = 1;
    cfg.overwrite_existing = true;

    let mut controller = CaptureController::new(device, cfg);
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    let report = controller.stop().unwrap();

    assert_eq!(controller.state(), CaptureState::Closed);
    assert!(report.channels[0].is_clean());
    assert_eq!(report.channels[0].slices_written, 50);
    assert!(report.channels[1].error.is_some());
    assert_eq!(report.exit_code(), 4);
    assert_eq!(read_channel(dir.path(), 0).len(), 50 * 64);
}

#[test]
fn oversized_drain_timeout_still_closes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(2).with_periods(10);
    let progress = device.progress();
    let mut cfg = config(dir.path(), 2, 32, 16);
    cfg.drain_timeout = Some(Duration::from_secs(u64::MAX / 2));
    assert!(cfg.validate().is_ok());

    let mut controller = CaptureController::new(device, cfg);
    controller.open().unwrap();
    controller.start().unwrap();
    assert!(progress.wait_finished(Duration::from_secs(10)));
    let report = controller.stop().unwrap();

    assert_eq!(controller.state(), CaptureState::Closed);
    assert!(report.is_clean());
    assert_eq!(read_channel(dir.path(), 1).len(), 10 * 32);
}
