//! Bounded handoff from the real-time callback to the channel writers.
//!
//! Each channel gets its own lane: a wait-free SPSC ring of filled slices
//! (callback → writer) and a second ring returning emptied storage
//! (writer → callback). All sample storage is allocated up front, so the
//! producer side never allocates, locks, or blocks.
//!
//! ```text
//!            ┌── entries ──────────────▶┐
//! [callback] │                          │ [writer c]
//!            └◀────────────── free ─────┘
//! ```
//!
//! Overflow policy: drop incoming. When a lane has no free storage, because
//! `capacity` slices are already queued or being written, the new slice is
//! discarded and the lane's drop counter is incremented.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::models::audio_models::ChannelSlice;

const SPIN_LIMIT: u32 = 6;
const MIN_SLEEP: Duration = Duration::from_micros(50);
const MAX_SLEEP: Duration = Duration::from_millis(1);

/// Result of pushing one channel's slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Queued,
    Dropped,
}

/// Result of pushing one period across all channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodPush {
    pub queued: u16,
    pub dropped: u16,
}

#[derive(Debug, Default)]
struct LaneCounters {
    dropped: AtomicU64,
    queued: AtomicU64,
    /// Last queued sequence + 1; zero means nothing queued yet.
    last_queued: AtomicU64,
}

#[derive(Debug)]
struct QueueShared {
    closed: AtomicBool,
    periods: AtomicU64,
    lanes: Box<[LaneCounters]>,
}

struct ProducerLane {
    entries: Producer<ChannelSlice>,
    free: Consumer<Box<[f32]>>,
}

/// Real-time side of the queue. Owned by the capture callback.
pub struct QueueProducer {
    lanes: Vec<ProducerLane>,
    shared: Arc<QueueShared>,
}

/// Writer side of one channel's lane.
pub struct ChannelConsumer {
    channel: u16,
    entries: Consumer<ChannelSlice>,
    free: Producer<Box<[f32]>>,
    shared: Arc<QueueShared>,
}

/// Control and statistics view held by the lifecycle controller.
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<QueueShared>,
}

/// Create a queue with `capacity` slices of `frames_per_period` samples per
/// channel.
pub fn create_transfer_queue(
    channels: u16,
    frames_per_period: usize,
    capacity: usize,
) -> (QueueProducer, Vec<ChannelConsumer>, QueueHandle) {
    let capacity = capacity.max(1);
    let shared = Arc::new(QueueShared {
        closed: AtomicBool::new(false),
        periods: AtomicU64::new(0),
        lanes: (0..channels).map(|_| LaneCounters::default()).collect(),
    });

    let mut producer_lanes = Vec::with_capacity(channels as usize);
    let mut consumers = Vec::with_capacity(channels as usize);

    for channel in 0..channels {
        // The entries ring is as large as the pool, so a push that found free
        // storage always has room.
        let (entries_tx, entries_rx) = RingBuffer::<ChannelSlice>::new(capacity);
        let (mut free_tx, free_rx) = RingBuffer::<Box<[f32]>>::new(capacity);
        for _ in 0..capacity {
            let _ = free_tx.push(vec![0.0f32; frames_per_period].into_boxed_slice());
        }

        producer_lanes.push(ProducerLane {
            entries: entries_tx,
            free: free_rx,
        });
        consumers.push(ChannelConsumer {
            channel,
            entries: entries_rx,
            free: free_tx,
            shared: Arc::clone(&shared),
        });
    }

    let producer = QueueProducer {
        lanes: producer_lanes,
        shared: Arc::clone(&shared),
    };
    (producer, consumers, QueueHandle { shared })
}

impl QueueProducer {
    pub fn channels(&self) -> usize {
        self.lanes.len()
    }

    /// Move `staging`'s contents into `channel`'s lane.
    ///
    /// On success `staging` is replaced by an empty pooled buffer of the same
    /// size. Never blocks or allocates.
    pub fn push(
        &mut self,
        channel: usize,
        sequence: u64,
        frames: usize,
        staging: &mut Box<[f32]>,
    ) -> PushStatus {
        let counters = &self.shared.lanes[channel];
        let lane = &mut self.lanes[channel];

        let Ok(mut storage) = lane.free.pop() else {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return PushStatus::Dropped;
        };
        std::mem::swap(staging, &mut storage);

        let slice = ChannelSlice {
            sequence,
            channel: channel as u16,
            frames,
            samples: storage,
        };
        match lane.entries.push(slice) {
            Ok(()) => {
                counters.queued.fetch_add(1, Ordering::Relaxed);
                counters.last_queued.store(sequence + 1, Ordering::Release);
                PushStatus::Queued
            }
            Err(PushError::Full(slice)) => {
                // Unreachable while the pool and the ring share one capacity.
                *staging = slice.samples;
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                PushStatus::Dropped
            }
        }
    }

    /// Push every channel's staged slice for one period.
    pub fn push_period(
        &mut self,
        sequence: u64,
        frames: usize,
        staging: &mut [Box<[f32]>],
    ) -> PeriodPush {
        let mut result = PeriodPush::default();
        let channels = self.lanes.len().min(staging.len());
        for (channel, buffer) in staging.iter_mut().enumerate().take(channels) {
            match self.push(channel, sequence, frames, buffer) {
                PushStatus::Queued => result.queued += 1,
                PushStatus::Dropped => result.dropped += 1,
            }
        }
        self.shared.periods.fetch_add(1, Ordering::Release);
        result
    }
}

impl ChannelConsumer {
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Next slice without waiting.
    pub fn try_pop(&mut self) -> Option<ChannelSlice> {
        self.entries.pop().ok()
    }

    /// Next slice, waiting with backoff while the lane is empty.
    ///
    /// Returns `None` once the queue is closed (or its producer is gone) and
    /// every remaining slice has been taken.
    pub fn pop(&mut self) -> Option<ChannelSlice> {
        let mut backoff = Backoff::new();
        loop {
            if let Ok(slice) = self.entries.pop() {
                return Some(slice);
            }
            if self.shared.closed.load(Ordering::Acquire) || self.entries.is_abandoned() {
                return self.entries.pop().ok();
            }
            backoff.snooze();
        }
    }

    /// Return a written slice's storage to the producer's pool.
    pub fn recycle(&mut self, storage: Box<[f32]>) {
        let _ = self.free.push(storage);
    }

    /// Slices waiting in this lane.
    pub fn pending(&self) -> usize {
        self.entries.slots()
    }
}

impl QueueHandle {
    /// Mark the queue closed. Call only after the producer has stopped.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Periods offered by the producer, whether queued or dropped.
    pub fn periods(&self) -> u64 {
        self.shared.periods.load(Ordering::Acquire)
    }

    /// Drop counter for `channel`.
    pub fn dropped(&self, channel: u16) -> u64 {
        self.shared.lanes[channel as usize]
            .dropped
            .load(Ordering::Relaxed)
    }

    pub fn queued(&self, channel: u16) -> u64 {
        self.shared.lanes[channel as usize]
            .queued
            .load(Ordering::Relaxed)
    }

    /// Highest sequence number queued on `channel`, if any.
    pub fn last_queued(&self, channel: u16) -> Option<u64> {
        match self.shared.lanes[channel as usize]
            .last_queued
            .load(Ordering::Acquire)
        {
            0 => None,
            n => Some(n - 1),
        }
    }

    pub fn total_dropped(&self) -> u64 {
        self.shared
            .lanes
            .iter()
            .map(|l| l.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

/// Spin briefly, then sleep with doubling intervals.
struct Backoff {
    step: u32,
    sleep: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            step: 0,
            sleep: MIN_SLEEP,
        }
    }

    fn snooze(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                std::hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::sleep(self.sleep);
            self.sleep = (self.sleep * 2).min(MAX_SLEEP);
        }
    }
}
