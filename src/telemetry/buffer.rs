// src/telemetry/buffer.rs
//
// Client-side sample history: a bounded FIFO for charting and an unbounded
// newest-first sequence for the table view. Rebuilt fresh on every
// (re)connect so stale readings never mix into a new session.

use std::collections::VecDeque;

pub type Sample = serde_json::Value;

#[derive(Debug)]
pub struct SampleBuffers {
    chart: VecDeque<Sample>,
    table: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            chart: VecDeque::with_capacity(capacity),
            table: VecDeque::new(),
            capacity,
        }
    }

    /// Record one sample: append to the chart (evicting the oldest entry at
    /// capacity) and prepend to the table.
    pub fn push(&mut self, sample: Sample) {
        if self.chart.len() >= self.capacity {
            self.chart.pop_front();
        }
        self.chart.push_back(sample.clone());
        self.table.push_front(sample);
    }

    /// Chart window, oldest first.
    pub fn chart(&self) -> impl Iterator<Item = &Sample> {
        self.chart.iter()
    }

    /// Full history, newest first.
    pub fn table(&self) -> impl Iterator<Item = &Sample> {
        self.table.iter()
    }

    pub fn chart_len(&self) -> usize {
        self.chart.len()
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.table.front()
    }

    pub fn clear(&mut self) {
        self.chart.clear();
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chart_evicts_oldest_at_capacity() {
        let mut buffers = SampleBuffers::new(50);
        for i in 0..60 {
            buffers.push(json!({ "seq": i }));
        }

        assert_eq!(buffers.chart_len(), 50);
        // Oldest ten evicted: the window starts at seq 10
        assert_eq!(buffers.chart().next().unwrap()["seq"], 10);
        assert_eq!(buffers.chart().last().unwrap()["seq"], 59);
    }

    #[test]
    fn test_table_is_unbounded_and_newest_first() {
        let mut buffers = SampleBuffers::new(50);
        for i in 0..60 {
            buffers.push(json!({ "seq": i }));
        }

        assert_eq!(buffers.table_len(), 60);
        assert_eq!(buffers.latest().unwrap()["seq"], 59);
        let seqs: Vec<i64> = buffers.table().map(|s| s["seq"].as_i64().unwrap()).collect();
        assert!(seqs.windows(2).all(|w| w[0] > w[1]));
        // Table always holds at least as much as the chart
        assert!(buffers.table_len() >= buffers.chart_len());
    }

    #[test]
    fn test_under_capacity_keeps_everything() {
        let mut buffers = SampleBuffers::new(50);
        for i in 0..12 {
            buffers.push(json!({ "seq": i }));
        }
        assert_eq!(buffers.chart_len(), 12);
        assert_eq!(buffers.table_len(), 12);
    }

    #[test]
    fn test_clear_empties_both() {
        let mut buffers = SampleBuffers::new(50);
        buffers.push(json!({ "seq": 0 }));
        buffers.clear();
        assert_eq!(buffers.chart_len(), 0);
        assert_eq!(buffers.table_len(), 0);
        assert!(buffers.latest().is_none());
    }
}
