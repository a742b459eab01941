//! Fast packet reassembly state
//!
//! Every in-flight multi-frame message owns one [`ReassemblyEntry`], addressed
//! by a stable [`EntryId`]. Entries are looked up by (PGN, source, sequence id)
//! and are removed either when complete or when the garbage collector finds
//! them older than [`ENTRY_MAX_AGE`].
//!
//! Fast packet framing: byte 0 of every frame carries the sequence id in its
//! top 3 bits and a frame counter in the low 5 bits. The first frame (counter 0)
//! carries the total length in byte 1 and 6 payload bytes, each following frame
//! carries 7 payload bytes.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::frame::CAN_MAX_DLEN;
use crate::header::FrameHeader;

/// Number of stored entries that forces a garbage collection run
pub const GC_THRESHOLD: usize = 100;

/// Max time between garbage collection runs
pub const GC_INTERVAL: Duration = Duration::from_secs(10);

/// Entries older than this are dropped by the garbage collector
pub const ENTRY_MAX_AGE: Duration = Duration::from_secs(100);

/// Largest payload a fast packet can carry: 6 bytes plus 31 frames of 7
pub const MAX_FAST_PACKET_LEN: usize = 223;

const FIRST_FRAME_PAYLOAD: usize = 6;
const NEXT_FRAME_PAYLOAD: usize = 7;
const SEQUENCE_MASK: u8 = 0xE0;
const COUNTER_MASK: u8 = 0x1F;

/// Stable handle to a table entry, never reused within one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

// Key for in-flight messages: (PGN, Source, sequence id high bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntryKey {
    pgn: u32,
    source: u8,
    sequence: u8,
}

impl EntryKey {
    fn new(header: &FrameHeader, sid: u8) -> Self {
        Self {
            pgn: header.pgn,
            source: header.source,
            sequence: sid & SEQUENCE_MASK,
        }
    }
}

/// One multi-frame message being assembled
#[derive(Debug, Clone)]
pub struct ReassemblyEntry {
    time_arrived: Instant,
    header: Option<FrameHeader>,
    sequence_id: u8,
    last_counter: u8,
    expected_length: usize,
    cursor: usize,
    data: Vec<u8>,
}

impl ReassemblyEntry {
    fn new(time_arrived: Instant) -> Self {
        Self {
            time_arrived,
            header: None,
            sequence_id: 0,
            last_counter: 0,
            expected_length: 0,
            cursor: 0,
            data: Vec::new(),
        }
    }

    pub fn header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    /// Byte 0 of the first fragment
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    pub fn expected_length(&self) -> usize {
        self.expected_length
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes assembled so far
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.cursor]
    }

    pub fn is_complete(&self) -> bool {
        self.header.is_some() && self.cursor >= self.expected_length
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.time_arrived) > ENTRY_MAX_AGE
    }

    fn key(&self) -> Option<EntryKey> {
        self.header
            .as_ref()
            .map(|header| EntryKey::new(header, self.sequence_id))
    }
}

/// Snapshot of table bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub in_flight: usize,
    pub dropped_frames: u64,
    pub dropped_frame_time: Option<DateTime<Utc>>,
}

/// Fast message reassembly table
///
/// Not synchronized: one table belongs to one decoding context.
#[derive(Debug)]
pub struct ReassemblyTable {
    entries: BTreeMap<EntryId, ReassemblyEntry>,
    index: HashMap<EntryKey, EntryId>,
    next_id: u64,
    last_gc_run: Instant,
    dropped_frames: u64,
    dropped_frame_time: Option<DateTime<Utc>>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
            last_gc_run: Instant::now(),
            dropped_frames: 0,
            dropped_frame_time: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&ReassemblyEntry> {
        self.entries.get(&id)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            in_flight: self.entries.len(),
            dropped_frames: self.dropped_frames,
            dropped_frame_time: self.dropped_frame_time,
        }
    }

    /// Find the incomplete entry for this PGN/source whose sequence id shares
    /// the top 3 bits of `sid`
    ///
    /// A continuation fragment whose first frame was missed finds nothing here
    /// and is indistinguishable from the start of a new message.
    pub fn find_matching(&self, header: &FrameHeader, sid: u8) -> Option<EntryId> {
        let id = *self.index.get(&EntryKey::new(header, sid))?;
        self.entries
            .get(&id)
            .filter(|entry| !entry.is_complete())
            .map(|_| id)
    }

    /// Allocate a fresh, empty entry
    pub fn add_new(&mut self) -> EntryId {
        self.add_new_at(Instant::now())
    }

    pub fn add_new_at(&mut self, now: Instant) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, ReassemblyEntry::new(now));
        id
    }

    /// Store the first fragment of a message into entry `id`
    ///
    /// Returns true when the message is already complete (total length of 6
    /// bytes or less). A declared length above [`MAX_FAST_PACKET_LEN`] cannot
    /// be sent as a fast packet; the entry is discarded.
    pub fn insert(&mut self, header: &FrameHeader, data: &[u8; CAN_MAX_DLEN], id: EntryId) -> bool {
        if data[1] as usize > MAX_FAST_PACKET_LEN {
            debug!("Fast packet length {} too long for {}", data[1], header);
            self.remove(id);
            self.record_drop();
            return false;
        }

        let key = EntryKey::new(header, data[0]);

        // Keep one entry per key
        if let Some(previous) = self.index.insert(key, id)
            && previous != id
            && self.entries.remove(&previous).is_some()
        {
            debug!("Replacing stale fast packet entry for {}", header);
            self.record_drop();
        }

        let Some(entry) = self.entries.get_mut(&id) else {
            warn!("Fast packet insert into unknown entry {:?}", id);
            self.index.remove(&key);
            return false;
        };

        let expected_length = data[1] as usize;
        let first = FIRST_FRAME_PAYLOAD.min(expected_length);

        entry.header = Some(*header);
        entry.sequence_id = data[0];
        entry.last_counter = data[0] & COUNTER_MASK;
        entry.expected_length = expected_length;
        entry.data = vec![0u8; expected_length];
        entry.data[..first].copy_from_slice(&data[2..2 + first]);
        entry.cursor = first;

        entry.cursor >= entry.expected_length
    }

    /// Append a continuation fragment to entry `id`
    ///
    /// Copies at most 7 bytes and never moves the cursor past the expected
    /// length. A fragment with frame counter 0 restarts the entry as a new
    /// message. Any other out-of-sequence fragment discards the entry.
    pub fn append(&mut self, header: &FrameHeader, data: &[u8; CAN_MAX_DLEN], id: EntryId) -> bool {
        self.append_at(header, data, id, Instant::now())
    }

    pub fn append_at(
        &mut self,
        header: &FrameHeader,
        data: &[u8; CAN_MAX_DLEN],
        id: EntryId,
        now: Instant,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            warn!("Fast packet append to unknown entry {:?}", id);
            return false;
        };

        let counter = data[0] & COUNTER_MASK;
        if counter == 0 {
            debug!("Fast packet restarted before completion: {}", header);
            entry.time_arrived = now;
            self.record_drop();
            return self.insert(header, data, id);
        }

        let expected_counter = entry.last_counter.wrapping_add(1) & COUNTER_MASK;
        if counter != expected_counter {
            debug!(
                "Fast packet out of sequence for {}: expected frame {}, got {}",
                header, expected_counter, counter
            );
            self.remove(id);
            self.record_drop();
            return false;
        }

        let needed = entry.expected_length.saturating_sub(entry.cursor);
        let count = needed.min(NEXT_FRAME_PAYLOAD);
        let cursor = entry.cursor;
        entry.data[cursor..cursor + count].copy_from_slice(&data[1..1 + count]);
        entry.cursor += count;
        entry.last_counter = counter;

        entry.cursor >= entry.expected_length
    }

    /// Remove entry `id`; removing an unknown id does nothing
    pub fn remove(&mut self, id: EntryId) -> Option<ReassemblyEntry> {
        let entry = self.entries.remove(&id)?;
        if let Some(key) = entry.key()
            && self.index.get(&key) == Some(&id)
        {
            self.index.remove(&key);
        }
        Some(entry)
    }

    /// Drop every entry older than [`ENTRY_MAX_AGE`], returns the number dropped
    pub fn garbage_collect(&mut self) -> usize {
        self.garbage_collect_at(Instant::now())
    }

    pub fn garbage_collect_at(&mut self, now: Instant) -> usize {
        let stale: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(entry) = self.remove(*id) {
                debug!(
                    "Dropping stale fast packet ({} of {} bytes) {}",
                    entry.cursor,
                    entry.expected_length,
                    entry.header.map(|h| h.to_string()).unwrap_or_default()
                );
            }
            self.record_drop();
        }
        stale.len()
    }

    /// Run the garbage collector if the interval elapsed or the table is too big
    ///
    /// Returns the number of removed entries when a run happened.
    pub fn check_gc(&mut self) -> Option<usize> {
        self.check_gc_at(Instant::now())
    }

    pub fn check_gc_at(&mut self, now: Instant) -> Option<usize> {
        if now.saturating_duration_since(self.last_gc_run) > GC_INTERVAL
            || self.entries.len() > GC_THRESHOLD
        {
            let removed = self.garbage_collect_at(now);
            self.last_gc_run = now;
            Some(removed)
        } else {
            None
        }
    }

    fn record_drop(&mut self) {
        self.dropped_frames += 1;
        self.dropped_frame_time = Some(Utc::now());
    }
}

impl Default for ReassemblyTable {
    fn default() -> Self {
        Self::new()
    }
}
