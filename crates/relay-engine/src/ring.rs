// Bounded per-topic history used for replay on subscribe. Appending past
// capacity silently overwrites the oldest entry; that policy is the buffer.
use relay_wire::Message;
use std::collections::VecDeque;
use std::sync::RwLock;

#[derive(Debug)]
pub struct HistoryBuffer {
    entries: RwLock<VecDeque<Message>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    // The deque never grows beyond capacity, so append stays O(1).
    pub fn append(&self, message: Message) {
        let mut entries = self.entries.write().expect("history lock");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(message);
    }

    /// The most recent `min(n, size)` entries in chronological order, the
    /// oldest of the returned window first.
    pub fn last(&self, n: usize) -> Vec<Message> {
        let entries = self.entries.read().expect("history lock");
        if n == 0 || entries.is_empty() {
            return Vec::new();
        }
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.entries.read().expect("history lock").len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
