use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Anything which becomes due at some point in time. Times are in seconds.
pub trait EndTime {
    fn end_time(&self) -> f64;
}

struct Entry<T> {
    end_time: f64,
    // insertion counter. Entries with equal end times leave the queue in insertion order.
    seq: u64,
    value: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap is a max heap, so the comparison is reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .end_time
            .total_cmp(&self.end_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue ordered by earliest end time. Entries with equal end time are FIFO.
pub struct TimeQueue<T: EndTime> {
    q: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T: EndTime> Default for TimeQueue<T> {
    fn default() -> Self {
        TimeQueue {
            q: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T: EndTime> std::fmt::Debug for TimeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeQueue {{ len: {} }}", self.q.len())
    }
}

impl<T: EndTime> TimeQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: T) {
        let end_time = value.end_time();
        self.q.push(Entry {
            end_time,
            seq: self.next_seq,
            value,
        });
        self.next_seq += 1;
    }

    pub fn peek(&self) -> Option<&T> {
        self.q.peek().map(|e| &e.value)
    }

    pub fn pop(&mut self) -> Option<T> {
        self.q.pop().map(|e| e.value)
    }

    /// Removes the first entry if it is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<T> {
        if self.q.peek()?.end_time <= now {
            self.pop()
        } else {
            None
        }
    }

    /// Removes all entries which are due at `now`, earliest first.
    pub fn pop_all_due(&mut self, now: f64) -> Vec<T> {
        let mut result = Vec::new();
        while let Some(value) = self.pop_due(now) {
            result.push(value);
        }
        result
    }

    /// Removes all entries, earliest first.
    pub fn drain_sorted(&mut self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.q.len());
        while let Some(value) = self.pop() {
            result.push(value);
        }
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.q.iter().map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
