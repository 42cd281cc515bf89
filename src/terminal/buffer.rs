//! Bounded output buffer for terminal sessions.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct Chunks {
    chunks: VecDeque<Vec<u8>>,
    total: usize,
}

/// Capacity-limited store of byte chunks in arrival order.
///
/// After each append whole chunks are evicted from the oldest end while the
/// total exceeds the capacity. A chunk is never split: the total only exceeds
/// the capacity inside `append`, and a single chunk larger than the capacity
/// evicts itself along with everything before it.
#[derive(Debug)]
pub struct OutputBuffer {
    capacity: usize,
    inner: Mutex<Chunks>,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Chunks::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `data` as one chunk. Empty slices are ignored.
    pub fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.chunks.push_back(data.to_vec());
        inner.total += data.len();

        while inner.total > self.capacity {
            let Some(oldest) = inner.chunks.pop_front() else {
                break;
            };
            inner.total -= oldest.len();
        }
    }

    /// All buffered bytes concatenated, optionally emptying the buffer.
    pub fn read(&self, clear: bool) -> Vec<u8> {
        let mut inner = self.inner.lock();
        let mut out = Vec::with_capacity(inner.total);
        for chunk in &inner.chunks {
            out.extend_from_slice(chunk);
        }
        if clear {
            inner.chunks.clear();
            inner.total = 0;
        }
        out
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.chunks.clear();
        inner.total = 0;
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.lock().chunks.len()
    }
}
