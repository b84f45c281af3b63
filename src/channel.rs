//! Log channel: bounded ring of committed records with reserve/commit writes
//!
//! Writers reserve a zeroed record buffer, fill it, and commit it as one
//! indivisible record. Committed records land in a lock-free bounded queue
//! (`crossbeam::queue::ArrayQueue`) that readers drain.
//!
//! # Recursion protection
//!
//! Each thread keeps, per channel, a count of open reservations (`depth`)
//! and a count of nesting markers (`nest`). A reservation attempted while
//! `depth > nest` is treated as runaway recursion and rejected. A writer
//! that legitimately emits from inside another record's handling raises the
//! nesting marker first ([`LogChannel::nest`]), which admits exactly one
//! more level. The state is per thread, so concurrent writers on other
//! threads never see each other's counters.
//!
//! # Discard mode
//!
//! A discard channel counts open reservations as pending slots. A reserve
//! succeeds only while `len + pending < capacity`, so a reserved record
//! always has room when it commits.
//!
//! ```text
//! thread A:  nest+1 ─ reserve(X) ─ nest+1 ─ reserve(Y) ─ commit(Y) ─ nest-1 ─ commit(X) ─ nest-1
//!            depth:     1                     2            1                    0
//! thread B:  reserve(Z) ─ reserve(W) ✗ recursion (depth 1 > nest 0)
//! ```

use crate::config::{ChannelConfig, OverflowPolicy};
use crate::error::ChannelError;
use crate::record::{Record, RecordHeader, FLAG_NESTED, HEADER_SIZE};
use crossbeam::queue::ArrayQueue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::warn;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default, Clone, Copy)]
struct WriterState {
    depth: u32,
    nest: u32,
}

thread_local! {
    static WRITERS: RefCell<HashMap<u64, WriterState>> = RefCell::new(HashMap::new());
}

fn with_writer<R>(channel: u64, f: impl FnOnce(&mut WriterState) -> R) -> R {
    WRITERS.with(|writers| {
        let mut writers = writers.borrow_mut();
        let state = writers.entry(channel).or_default();
        let out = f(state);
        if state.depth == 0 && state.nest == 0 {
            writers.remove(&channel);
        }
        out
    })
}

/// Bounded, append-mostly record log
pub struct LogChannel {
    id: u64,
    queue: ArrayQueue<Record>,
    overflow: OverflowPolicy,
    max_nesting: u32,
    pending: AtomicUsize,
    total_reserved: AtomicU64,
    total_committed: AtomicU64,
    total_dropped: AtomicU64,
    total_overwritten: AtomicU64,
    recursion_rejects: AtomicU64,
}

impl LogChannel {
    /// Create a channel
    ///
    /// # Panics
    ///
    /// Panics if `config.capacity` is 0.
    pub fn new(config: &ChannelConfig) -> Self {
        assert!(config.capacity > 0, "Log channel capacity must be > 0");

        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            queue: ArrayQueue::new(config.capacity),
            overflow: config.overflow,
            max_nesting: config.max_nesting,
            pending: AtomicUsize::new(0),
            total_reserved: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            total_overwritten: AtomicU64::new(0),
            recursion_rejects: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reserve a zeroed record of `HEADER_SIZE + payload_len` bytes
    ///
    /// The header is filled in here. The reservation commits when it is
    /// committed explicitly or dropped, whichever comes first.
    pub fn reserve(&self, event_id: u16, payload_len: usize) -> Result<Reservation<'_>, ChannelError> {
        let depth = with_writer(self.id, |state| {
            if state.depth > state.nest {
                return Err(ChannelError::Recursion(self.id));
            }
            if state.depth >= self.max_nesting {
                return Err(ChannelError::NestingTooDeep {
                    depth: state.depth + 1,
                    max: self.max_nesting,
                });
            }
            if self.overflow == OverflowPolicy::Discard && !self.claim_slot() {
                return Err(ChannelError::Full(self.id));
            }
            state.depth += 1;
            Ok(state.depth)
        });

        let depth = match depth {
            Ok(depth) => depth,
            Err(err) => {
                match err {
                    ChannelError::Recursion(_) => {
                        self.recursion_rejects.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {
                        self.total_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                warn!(channel = self.id, event_id, %err, "record reservation failed");
                return Err(err);
            }
        };

        let mut bytes = vec![0u8; HEADER_SIZE + payload_len].into_boxed_slice();
        RecordHeader {
            event_id,
            flags: if depth > 1 { FLAG_NESTED } else { 0 },
            depth: depth.min(u8::MAX as u32) as u8,
            pid: std::process::id(),
        }
        .write(&mut bytes);

        self.total_reserved.fetch_add(1, Ordering::Relaxed);
        Ok(Reservation {
            channel: self,
            bytes: Some(bytes),
            _not_send: PhantomData,
        })
    }

    /// Raise this thread's nesting marker until the guard drops
    pub fn nest(&self) -> NestGuard<'_> {
        with_writer(self.id, |state| state.nest += 1);
        NestGuard {
            channel: self,
            _not_send: PhantomData,
        }
    }

    /// Claim room for one record in a discard channel
    fn claim_slot(&self) -> bool {
        let mut pending = self.pending.load(Ordering::Acquire);
        loop {
            if self.queue.len() + pending >= self.queue.capacity() {
                return false;
            }
            match self.pending.compare_exchange_weak(
                pending,
                pending + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => pending = current,
            }
        }
    }

    fn commit(&self, bytes: Box<[u8]>) {
        with_writer(self.id, |state| state.depth = state.depth.saturating_sub(1));

        let record = Record::from_bytes(bytes);
        match self.overflow {
            OverflowPolicy::Overwrite => {
                if self.queue.force_push(record).is_some() {
                    self.total_overwritten.fetch_add(1, Ordering::Relaxed);
                }
                self.total_committed.fetch_add(1, Ordering::Relaxed);
            }
            OverflowPolicy::Discard => {
                let pushed = self.queue.push(record);
                // released only after the record is visible in the queue
                self.pending.fetch_sub(1, Ordering::AcqRel);
                match pushed {
                    Ok(()) => {
                        self.total_committed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_dropped) => {
                        self.total_dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(channel = self.id, "log channel full - record dropped");
                    }
                }
            }
        }
    }

    /// Take the oldest committed record
    pub fn pop(&self) -> Option<Record> {
        self.queue.pop()
    }

    /// Take every committed record, oldest first
    pub fn drain(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.queue.len());
        while let Some(record) = self.queue.pop() {
            records.push(record);
        }
        records
    }

    /// Discard all committed records
    pub fn reset(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            total_reserved: self.total_reserved.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            total_overwritten: self.total_overwritten.load(Ordering::Relaxed),
            recursion_rejects: self.recursion_rejects.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new(&ChannelConfig::default())
    }
}

impl std::fmt::Debug for LogChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogChannel")
            .field("id", &self.id)
            .field("overflow", &self.overflow)
            .field("stats", &self.stats())
            .finish()
    }
}

/// An open record write; commits exactly once
///
/// Bound to the reserving thread, since the recursion counters are.
pub struct Reservation<'a> {
    channel: &'a LogChannel,
    bytes: Option<Box<[u8]>>,
    _not_send: PhantomData<*const ()>,
}

impl Reservation<'_> {
    /// Record bytes after the header
    pub fn payload_mut(&mut self) -> &mut [u8] {
        match self.bytes.as_deref_mut() {
            Some(bytes) => &mut bytes[HEADER_SIZE..],
            None => &mut [],
        }
    }

    pub fn header(&self) -> Option<RecordHeader> {
        self.bytes
            .as_deref()
            .and_then(|b| RecordHeader::read(b).ok())
    }

    pub fn commit(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(bytes) = self.bytes.take() {
            self.channel.commit(bytes);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Nesting marker held for the lifetime of the guard
pub struct NestGuard<'a> {
    channel: &'a LogChannel,
    _not_send: PhantomData<*const ()>,
}

impl Drop for NestGuard<'_> {
    fn drop(&mut self) {
        with_writer(self.channel.id, |state| state.nest = state.nest.saturating_sub(1));
    }
}

/// Channel statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub total_reserved: u64,
    pub total_committed: u64,
    pub total_dropped: u64,
    pub total_overwritten: u64,
    pub recursion_rejects: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl ChannelStats {
    /// Fraction of write attempts that were dropped (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        let attempts = self.total_reserved + self.total_dropped + self.recursion_rejects;
        if attempts == 0 {
            0.0
        } else {
            (self.total_dropped + self.recursion_rejects) as f64 / attempts as f64
        }
    }

    /// Fill level (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
