// Rolling Time Window - bounded (timestamp, value) buffer
// Age-based pruning from the front plus a hard capacity cap

use std::collections::VecDeque;

/// Rolling window of `(timestamp_ms, value)` pairs in arrival order.
///
/// Pruning only inspects the front, so a late event stays until everything
/// queued before it has aged out.
#[derive(Debug, Clone)]
pub struct TimeWindow<T> {
    duration_ms: i64,
    capacity: usize,
    data: VecDeque<(i64, T)>,
}

impl<T> TimeWindow<T> {
    pub fn new(duration_ms: i64, capacity: usize) -> Self {
        Self {
            duration_ms,
            capacity: capacity.max(1),
            data: VecDeque::with_capacity(capacity.clamp(1, 1024)),
        }
    }

    /// Append an entry, dropping the oldest when full.
    pub fn push(&mut self, ts: i64, value: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back((ts, value));
    }

    /// Evict entries with `ts < now - duration_ms`. Returns how many were dropped.
    pub fn prune(&mut self, now: i64) -> usize {
        let cutoff = now.saturating_sub(self.duration_ms);
        let mut dropped = 0;
        while matches!(self.data.front(), Some((ts, _)) if *ts < cutoff) {
            self.data.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i64, T)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn last(&self) -> Option<&(i64, T)> {
        self.data.back()
    }

    pub fn first(&self) -> Option<&(i64, T)> {
        self.data.front()
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }
}

impl TimeWindow<f64> {
    /// Front-to-back sum. Order is fixed so repeated runs agree bit for bit.
    pub fn sum(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, (_, v)| acc + v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_last() {
        let mut window: TimeWindow<f64> = TimeWindow::new(1000, 100);
        window.push(100, 1.0);
        window.push(200, -2.0);
        window.push(300, 3.0);

        assert_eq!(window.len(), 3);
        assert_eq!(window.last(), Some(&(300, 3.0)));
        assert_eq!(window.sum(), 2.0);
    }

    #[test]
    fn test_prune_is_strictly_older() {
        let mut window: TimeWindow<f64> = TimeWindow::new(100, 100);
        for (ts, v) in [(0, 1.0), (50, 2.0), (100, 3.0), (150, 4.0), (200, 5.0)] {
            window.push(ts, v);
        }

        // cutoff = 100, the entry stamped exactly 100 survives
        assert_eq!(window.prune(200), 2);
        assert_eq!(window.len(), 3);
        assert_eq!(window.first(), Some(&(100, 3.0)));
    }

    #[test]
    fn test_capacity_cap() {
        let mut window: TimeWindow<i32> = TimeWindow::new(10_000, 3);
        window.push(100, 1);
        window.push(200, 2);
        window.push(300, 3);
        window.push(400, 4);

        assert_eq!(window.len(), 3);
        assert_eq!(window.first().map(|e| e.0), Some(200));
    }

    #[test]
    fn test_late_entry_waits_behind_front() {
        let mut window: TimeWindow<f64> = TimeWindow::new(100, 10);
        window.push(500, 1.0);
        window.push(10, 1.0);

        assert_eq!(window.prune(500), 0);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut window: TimeWindow<f64> = TimeWindow::new(10_000, 100);
        window.push(100, 1.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.sum(), 0.0);
    }
}
