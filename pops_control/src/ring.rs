//! Event ring consumer.
//!
//! The coprocessor appends two-word particle records to a 3072-word ring and
//! publishes its tail as an absolute address. [`RingBufferConsumer`] keeps the
//! host head, copies everything between head and tail into a scratch buffer
//! (linearising a wrap), decodes the record pairs and advances the head.
//!
//! ## Wrapped length
//!
//! For a wrapped region the processed length is `capacity - head + tail - 1`.
//! Pairs are decoded while both of their words were copied, so a producer that
//! keeps records word-aligned on even offsets loses nothing.

use pops_common::consts::{MAX_EVENTS_PER_SECOND, RING_CAPACITY_WORDS, tail_offset};
use pops_common::hal::pru::RingBufferSource;
use pops_common::types::ParticleEvent;
use thiserror::Error;

// ─── Event set ──────────────────────────────────────────────────────

/// One second of decoded events, capped at [`MAX_EVENTS_PER_SECOND`].
///
/// Storage is allocated once; `clear` keeps the capacity.
#[derive(Debug, Clone)]
pub struct EventSet {
    events: Vec<ParticleEvent>,
    discarded: u64,
}

impl EventSet {
    /// Create an empty set with room for a full second.
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(MAX_EVENTS_PER_SECOND),
            discarded: 0,
        }
    }

    /// Append an event. Returns `false` (and counts a discard) once full.
    #[inline]
    pub fn push(&mut self, event: ParticleEvent) -> bool {
        if self.events.len() >= MAX_EVENTS_PER_SECOND {
            self.discarded += 1;
            return false;
        }
        self.events.push(event);
        true
    }

    /// Retained events in arrival order.
    #[inline]
    pub fn as_slice(&self) -> &[ParticleEvent] {
        &self.events
    }

    /// Number of retained events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event has been retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped because the set was full.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Start a new second.
    pub fn clear(&mut self) {
        self.events.clear();
        self.discarded = 0;
    }
}

impl Default for EventSet {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Consumer ───────────────────────────────────────────────────────

/// Ring access errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// The published tail does not point into the ring.
    #[error("tail address {0:#010x} is outside the ring")]
    TailOutOfRange(u32),
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Words copied out of the ring.
    pub words: usize,
    /// Record pairs decoded.
    pub decoded: usize,
    /// Decoded events retained in the event set.
    pub kept: usize,
    /// The region crossed the end of the ring.
    pub wrapped: bool,
}

/// Host side of the single-producer/single-consumer event ring.
#[derive(Debug)]
pub struct RingBufferConsumer {
    head: usize,
    scratch: Box<[u32]>,
}

impl RingBufferConsumer {
    /// Consumer starting at the ring base.
    pub fn new() -> Self {
        Self::with_head(0)
    }

    /// Consumer resuming at a word offset.
    pub fn with_head(head: usize) -> Self {
        Self {
            head: head % RING_CAPACITY_WORDS,
            scratch: vec![0; RING_CAPACITY_WORDS].into_boxed_slice(),
        }
    }

    /// Current head word offset.
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Drain everything the producer has published since the last call.
    ///
    /// Never blocks. When tail equals head nothing is read and the head is
    /// left unchanged.
    ///
    /// # Errors
    /// [`RingError::TailOutOfRange`] if the tail address is not inside the
    /// ring; the head is not moved.
    pub fn drain_once<S: RingBufferSource + ?Sized>(
        &mut self,
        source: &S,
        events: &mut EventSet,
    ) -> Result<DrainStats, RingError> {
        let raw = source.tail_address();
        let tail = tail_offset(raw).ok_or(RingError::TailOutOfRange(raw))?;
        let head = self.head;
        if tail == head {
            return Ok(DrainStats::default());
        }

        let (copied, span, wrapped) = if tail > head {
            for (slot, offset) in self.scratch.iter_mut().zip(head..tail) {
                *slot = source.read_ring_word(offset);
            }
            (tail - head, tail - head, false)
        } else {
            let first = RING_CAPACITY_WORDS - head;
            for (slot, offset) in self.scratch[..first].iter_mut().zip(head..) {
                *slot = source.read_ring_word(offset);
            }
            for (slot, offset) in self.scratch[first..first + tail].iter_mut().zip(0..) {
                *slot = source.read_ring_word(offset);
            }
            let copied = first + tail;
            (copied, copied - 1, true)
        };

        let mut stats = DrainStats {
            words: copied,
            wrapped,
            ..DrainStats::default()
        };
        let mut j = 0;
        while j < span && j + 1 < copied {
            let event = ParticleEvent::from_words(self.scratch[j], self.scratch[j + 1]);
            stats.decoded += 1;
            if events.push(event) {
                stats.kept += 1;
            }
            j += 2;
        }

        self.head = tail;
        source.publish_head(tail);
        Ok(stats)
    }
}

impl Default for RingBufferConsumer {
    fn default() -> Self {
        Self::new()
    }
}
