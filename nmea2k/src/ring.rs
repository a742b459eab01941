use std::sync::{Mutex, MutexGuard};

/// Receive buffer size of a network session
pub const RX_BUFFER_SIZE_NET: usize = 4096;

#[derive(Debug)]
struct RingState {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    full: bool,
    overwritten: u64,
}

impl RingState {
    fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }
}

/// Fixed capacity byte ring shared between the network reader and the decoder
///
/// Writing into a full ring drops the oldest unread byte. Reading from an
/// empty ring returns 0. Every operation takes the internal lock for O(1)
/// work, so a producer and a consumer may run on different threads.
#[derive(Debug)]
pub struct ByteRing {
    state: Mutex<RingState>,
    capacity: usize,
}

impl ByteRing {
    /// # Arguments
    /// * `capacity` - Number of bytes held, at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                full: false,
                overwritten: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, byte: u8) {
        let mut state = self.lock();
        Self::put_locked(&mut state, self.capacity, byte);
    }

    /// Write a whole chunk under one lock
    pub fn put_slice(&self, bytes: &[u8]) {
        let mut state = self.lock();
        for &byte in bytes {
            Self::put_locked(&mut state, self.capacity, byte);
        }
    }

    fn put_locked(state: &mut RingState, capacity: usize, byte: u8) {
        let head = state.head;
        state.buf[head] = byte;
        if state.full {
            state.tail = (state.tail + 1) % capacity;
            state.overwritten += 1;
        }
        state.head = (head + 1) % capacity;
        state.full = state.head == state.tail;
    }

    pub fn get(&self) -> u8 {
        self.try_get().unwrap_or(0)
    }

    /// Like [`ByteRing::get`] but tells an empty ring apart from a 0 byte
    pub fn try_get(&self) -> Option<u8> {
        let mut state = self.lock();
        if state.is_empty() {
            return None;
        }
        let value = state.buf[state.tail];
        state.full = false;
        state.tail = (state.tail + 1) % self.capacity;
        Some(value)
    }

    pub fn empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn full(&self) -> bool {
        self.lock().full
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        if state.full {
            self.capacity
        } else if state.head >= state.tail {
            state.head - state.tail
        } else {
            self.capacity + state.head - state.tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes lost to overwrite since creation
    pub fn overwritten(&self) -> u64 {
        self.lock().overwritten
    }
}

impl Default for ByteRing {
    fn default() -> Self {
        Self::new(RX_BUFFER_SIZE_NET)
    }
}
