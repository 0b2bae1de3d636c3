//! Segment size scheduling and publication.
//!
//! Every `reschedule_interval` steps the scheduler recomputes the wire
//! segment size from a fixed two-phase curve: interval index `t` halves
//! the base size through `shrink_until`, regrows it back through
//! `regrow_until`, then holds at base. Rank 0 publishes the varying value
//! in the own-segment slot and base in the peer slot; every other rank
//! publishes the mirror image. Consumers poll the published record with
//! no handshake and may lag one interval behind.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::error::{Result, SyncraError};
use crate::types::{Rank, GRAD_ELEM_BYTES};

/// The closed-form segment size curve.
#[derive(Debug, Clone, Copy)]
pub struct SegmentSchedule {
    pub base_bytes: usize,
    pub shrink_until: u64,
    pub regrow_until: u64,
}

impl SegmentSchedule {
    /// Segment size for interval index `t`. Past the regrow phase the
    /// curve holds at base; the result never shrinks below one element.
    pub fn segment_bytes(&self, t: u64) -> usize {
        let bytes = if t <= self.shrink_until {
            self.base_bytes >> t.min(63) as u32
        } else if t <= self.regrow_until {
            self.base_bytes >> (self.regrow_until - t).min(63) as u32
        } else {
            self.base_bytes
        };
        bytes.max(GRAD_ELEM_BYTES)
    }
}

/// One published scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Segment size this worker chunks its sends with.
    pub own_bytes: usize,
    /// Segment size this worker believes its peers use. Advisory: frames
    /// are self-describing, so a stale value never corrupts a reduction.
    pub peer_bytes: usize,
    /// Monotone publication counter.
    pub version: u64,
}

impl SegmentRecord {
    /// Record in effect before the first publication.
    pub fn initial(base_bytes: usize) -> Self {
        Self {
            own_bytes: base_bytes,
            peer_bytes: base_bytes,
            version: 0,
        }
    }

    /// Own segment size in whole elements, never zero.
    pub fn own_elems(&self) -> usize {
        (self.own_bytes / GRAD_ELEM_BYTES).max(1)
    }
}

/// Where segment records live between publication and consumption.
///
/// Readers tolerate staleness of one scheduling interval; a read
/// observing the previous record is correct behavior, not an error.
pub trait SegmentStore: Send + Sync {
    /// Publish a record, superseding the previous one.
    fn publish(&self, record: SegmentRecord) -> Result<()>;

    /// Read the most recently observed record.
    fn read(&self) -> Result<SegmentRecord>;
}

/// Process-local versioned cell, the default store.
pub struct SegmentCell {
    record: RwLock<SegmentRecord>,
}

impl SegmentCell {
    pub fn new(initial: SegmentRecord) -> Self {
        Self {
            record: RwLock::new(initial),
        }
    }
}

impl SegmentStore for SegmentCell {
    fn publish(&self, record: SegmentRecord) -> Result<()> {
        let mut guard = self
            .record
            .write()
            .map_err(|_| SyncraError::LockPoisoned("segment cell"))?;
        *guard = record;
        Ok(())
    }

    fn read(&self) -> Result<SegmentRecord> {
        let guard = self
            .record
            .read()
            .map_err(|_| SyncraError::LockPoisoned("segment cell"))?;
        Ok(*guard)
    }
}

/// Store mirrored to a two-integer text file, `own peer` in decimal.
///
/// Several workers may share one path on a common filesystem; writes are
/// last-writer-wins and a torn or half-written file falls back to the
/// last good record.
pub struct FileSegmentStore {
    path: PathBuf,
    last_good: Mutex<SegmentRecord>,
}

impl FileSegmentStore {
    pub fn new(path: impl Into<PathBuf>, initial: SegmentRecord) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(initial),
        }
    }

    fn parse(text: &str) -> Option<(usize, usize)> {
        let mut fields = text.split_whitespace();
        let own = fields.next()?.parse().ok()?;
        let peer = fields.next()?.parse().ok()?;
        Some((own, peer))
    }
}

impl SegmentStore for FileSegmentStore {
    fn publish(&self, record: SegmentRecord) -> Result<()> {
        std::fs::write(
            &self.path,
            format!("{} {}", record.own_bytes, record.peer_bytes),
        )?;
        let mut guard = self
            .last_good
            .lock()
            .map_err(|_| SyncraError::LockPoisoned("segment file cache"))?;
        *guard = record;
        Ok(())
    }

    fn read(&self) -> Result<SegmentRecord> {
        let mut guard = self
            .last_good
            .lock()
            .map_err(|_| SyncraError::LockPoisoned("segment file cache"))?;
        if let Ok(text) = std::fs::read_to_string(&self.path) {
            if let Some((own, peer)) = Self::parse(&text) {
                if own != guard.own_bytes || peer != guard.peer_bytes {
                    *guard = SegmentRecord {
                        own_bytes: own,
                        peer_bytes: peer,
                        version: guard.version + 1,
                    };
                }
            }
        }
        Ok(*guard)
    }
}

/// Owns the step counter and drives publications.
pub struct SegmentScheduler {
    rank: Rank,
    schedule: SegmentSchedule,
    reschedule_interval: u64,
    step: u64,
    store: Arc<dyn SegmentStore>,
}

impl SegmentScheduler {
    pub fn new(
        rank: Rank,
        schedule: SegmentSchedule,
        reschedule_interval: u64,
        store: Arc<dyn SegmentStore>,
    ) -> Self {
        Self {
            rank,
            schedule,
            reschedule_interval,
            step: 0,
            store,
        }
    }

    /// Steps handed out so far.
    pub fn steps_begun(&self) -> u64 {
        self.step
    }

    /// Claim the next step index, publishing a fresh record on interval
    /// boundaries. Called exactly once per training step, before the
    /// step's first reduction.
    pub fn begin_step(&mut self) -> Result<u64> {
        let step = self.step;
        if step % self.reschedule_interval == 0 {
            let t = step / self.reschedule_interval;
            let record = self.record_for(t);
            self.store.publish(record)?;
            debug!(
                rank = self.rank,
                step,
                interval = t,
                own_bytes = record.own_bytes,
                peer_bytes = record.peer_bytes,
                "published segment record"
            );
        }
        self.step += 1;
        Ok(step)
    }

    fn record_for(&self, t: u64) -> SegmentRecord {
        let segment = self.schedule.segment_bytes(t);
        let base = self.schedule.base_bytes;
        let (own_bytes, peer_bytes) = if self.rank == 0 {
            (segment, base)
        } else {
            (base, segment)
        };
        SegmentRecord {
            own_bytes,
            peer_bytes,
            version: t,
        }
    }
}
