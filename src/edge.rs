//! ISR-side edge-to-edge delta capture.
//!
//! Grounded on the teacher's cross-interrupt-context SPSC usage
//! (`src/uart/rx_asynch.rs`, `heapless::spsc::Queue` split into a
//! `Producer`/`Consumer` pair) and on `Prj/DccDecoder/ISR_Dcc.cpp`'s
//! `micros()`-delta computation with first-edge discard.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::error::{Error, Result};

/// Edge timestamp capture, split across ISR (producer) and main-loop
/// (consumer) contexts. `N` is the queue's static capacity (usable depth is
/// `N - 1`, per `heapless::spsc::Queue`'s contract).
pub struct EdgeTimeQueue<const N: usize> {
    queue: Queue<u32, N>,
}

impl<const N: usize> EdgeTimeQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Split into a producer for the edge ISR and a consumer for the main
    /// loop. Call once at startup; the producer must not be handed out more
    /// than once per queue.
    pub fn split(&mut self) -> (EdgeProducer<'_, N>, EdgeConsumer<'_, N>) {
        let (producer, consumer) = self.queue.split();
        (
            EdgeProducer {
                producer,
                prev_timestamp_us: None,
            },
            EdgeConsumer { consumer },
        )
    }
}

impl<const N: usize> Default for EdgeTimeQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned by the edge ISR. Call [`EdgeProducer::on_edge`] with the free-running
/// microsecond counter value read inside the interrupt.
pub struct EdgeProducer<'q, const N: usize> {
    producer: Producer<'q, u32, N>,
    prev_timestamp_us: Option<u32>,
}

impl<const N: usize> EdgeProducer<'_, N> {
    /// Record one edge. The first call after construction is discarded (no
    /// previous timestamp to diff against), matching the original's
    /// `ulTimeStampPrev > 0u` guard -- modeled here as `Option` instead of a
    /// zero sentinel, since `micros()` legitimately returns 0 once per
    /// 2^32 us wrap.
    ///
    /// Returns `Err(Error::IsrOverflow)` on queue overflow; the sample is
    /// dropped either way.
    pub fn on_edge(&mut self, now_us: u32) -> Result<()> {
        let Some(prev) = self.prev_timestamp_us else {
            self.prev_timestamp_us = Some(now_us);
            return Ok(());
        };
        let delta = now_us.wrapping_sub(prev);
        self.prev_timestamp_us = Some(now_us);
        self.producer.enqueue(delta).map_err(|_| Error::IsrOverflow)
    }
}

/// Owned by the main loop. Drains deltas queued by the ISR.
pub struct EdgeConsumer<'q, const N: usize> {
    consumer: Consumer<'q, u32, N>,
}

impl<const N: usize> EdgeConsumer<'_, N> {
    pub fn dequeue(&mut self) -> Option<u32> {
        self.consumer.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.ready() == 0
    }
}
