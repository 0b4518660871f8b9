//! Overflow accounting through the queue and a channel writer.

use std::fs;
use std::sync::Arc;

use multichannel_capture_core::processing::raw_format;
use multichannel_capture_core::processing::transfer_queue::{create_transfer_queue, PushStatus};
use multichannel_capture_core::session::drain_latch::DrainLatch;
use multichannel_capture_core::storage::channel_writer::{run_writer, ChannelWriter};
use multichannel_capture_core::ErrorSignal;

#[test]
fn n_overflows_mean_n_drops_and_produced_minus_n_slices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channel_0.raw");
    let capacity = 4;
    let produced = 10u64;

    let (mut producer, mut consumers, handle) = create_transfer_queue(1, 8, capacity);
    let mut staging = [vec![0.0f32; 8].into_boxed_slice()];
    let mut statuses = Vec::new();
    for sequence in 0..produced {
        staging[0].fill(sequence as f32);
        statuses.push(producer.push(0, sequence, 8, &mut staging[0]));
    }
    handle.close();

    let overflows = statuses.iter().filter(|s| **s == PushStatus::Dropped).count() as u64;
    assert_eq!(overflows, produced - capacity as u64);
    assert_eq!(handle.dropped(0), overflows);

    let mut writer = ChannelWriter::new(0, path.clone(), 256);
    writer.open().unwrap();
    let latch = Arc::new(DrainLatch::new(1));
    let mut writer = run_writer(
        writer,
        consumers.remove(0),
        latch,
        Arc::new(ErrorSignal::new()),
    );
    writer.close().unwrap();

    let report = writer.report(handle.dropped(0));
    assert_eq!(report.slices_dropped, overflows);
    assert_eq!(report.slices_written, produced - overflows);

    let samples = raw_format::decode_samples_le(&fs::read(&path).unwrap());
    assert_eq!(samples.len() as u64, (produced - overflows) * 8);
    assert_eq!(samples[0], 0.0);
    assert_eq!(samples[samples.len() - 1], (capacity - 1) as f32);
}

#[test]
fn drops_between_writes_show_up_as_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let (mut producer, mut consumers, handle) = create_transfer_queue(1, 2, 2);
    let consumer = &mut consumers[0];
    let mut writer = ChannelWriter::new(0, dir.path().join("gaps.raw"), 64);
    writer.open().unwrap();

    let mut staging = vec![0.0f32; 2].into_boxed_slice();
    // Fill the pool, overflow twice, then let the writer catch up.
    for sequence in 0..4u64 {
        producer.push(0, sequence, 2, &mut staging);
    }
    while let Some(slice) = consumer.try_pop() {
        writer.write_slice(&slice).unwrap();
        consumer.recycle(slice.into_storage());
    }
    producer.push(0, 4, 2, &mut staging);
    let slice = consumer.try_pop().unwrap();
    writer.write_slice(&slice).unwrap();

    assert_eq!(handle.dropped(0), 2);
    assert_eq!(writer.gap_events(), 1);
    assert_eq!(writer.missing_slices(), handle.dropped(0));
    assert_eq!(writer.last_sequence(), Some(4));
}
