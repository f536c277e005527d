//! TraceBuffer: committed (time, value) samples for the strip chart

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One committed sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    /// Simulated time in ms
    pub t: f64,
    /// Output value at `t`
    pub y: f64,
}

/// How much history a buffer keeps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Retention {
    /// Keep the whole run (bounded runs: single twitch, load)
    Full,
    /// Keep only the trailing `span_ms` of simulated time (scrolling displays)
    Window { span_ms: f64 },
}

/// Hard cap on points regardless of retention
pub const DEFAULT_MAX_POINTS: usize = 20_000;

/// Ordered, append-only sample buffer with non-decreasing `t`
#[derive(Debug, Clone, PartialEq)]
pub struct TraceBuffer {
    points: VecDeque<TracePoint>,
    retention: Retention,
    max_points: usize,
}

impl TraceBuffer {
    pub fn new(retention: Retention) -> Self {
        Self::with_max_points(retention, DEFAULT_MAX_POINTS)
    }

    pub fn with_max_points(retention: Retention, max_points: usize) -> Self {
        Self {
            points: VecDeque::new(),
            retention,
            max_points: max_points.max(1),
        }
    }

    /// Append a sample.
    ///
    /// Returns `false` and leaves the buffer untouched when `t` is NaN or
    /// earlier than the last committed sample.
    pub fn push(&mut self, t: f64, y: f64) -> bool {
        if t.is_nan() {
            return false;
        }
        if let Some(last) = self.points.back() {
            if t < last.t {
                return false;
            }
        }

        self.points.push_back(TracePoint { t, y });

        if let Retention::Window { span_ms } = self.retention {
            let cutoff = t - span_ms.max(0.0);
            while self.points.front().map_or(false, |p| p.t < cutoff) {
                self.points.pop_front();
            }
        }
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }

        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn last(&self) -> Option<TracePoint> {
        self.points.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TracePoint> + '_ {
        self.points.iter()
    }

    /// Snapshot of the committed samples, oldest first
    pub fn to_vec(&self) -> Vec<TracePoint> {
        self.points.iter().copied().collect()
    }

    /// Samples with `t` in `[start, end]`
    pub fn slice_time(&self, start: f64, end: f64) -> Vec<TracePoint> {
        self.points
            .iter()
            .filter(|p| p.t >= start && p.t <= end)
            .copied()
            .collect()
    }

    /// Samples committed strictly after `t`, for incremental consumers
    pub fn since(&self, t: f64) -> Vec<TracePoint> {
        self.points.iter().filter(|p| p.t > t).copied().collect()
    }

    pub fn stats(&self) -> TraceStats {
        TraceStats::calculate(self.points.iter())
    }
}

/// Basic statistics for a trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Time of the first sample reaching `max`
    pub peak_time: f64,
    pub peak_to_peak: f64,
}

impl TraceStats {
    pub fn calculate<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a TracePoint>,
    {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut peak_time = 0.0;

        for point in points {
            count += 1;
            sum += point.y;
            min = min.min(point.y);
            if point.y > max {
                max = point.y;
                peak_time = point.t;
            }
        }

        if count == 0 {
            return Self {
                count: 0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                peak_time: 0.0,
                peak_to_peak: 0.0,
            };
        }

        Self {
            count,
            mean: sum / count as f64,
            min,
            max,
            peak_time,
            peak_to_peak: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_order_samples() {
        let mut buffer = TraceBuffer::new(Retention::Full);
        assert!(buffer.push(0.0, 0.0));
        assert!(buffer.push(5.0, 0.2));
        assert!(buffer.push(5.0, 0.3));
        assert!(!buffer.push(4.0, 1.0));
        assert!(!buffer.push(f64::NAN, 1.0));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.last(), Some(TracePoint { t: 5.0, y: 0.3 }));
    }

    #[test]
    fn test_window_drops_old_samples() {
        let mut buffer = TraceBuffer::new(Retention::Window { span_ms: 100.0 });
        for i in 0..=30 {
            buffer.push(i as f64 * 10.0, i as f64);
        }

        let samples = buffer.to_vec();
        assert_eq!(samples.first().unwrap().t, 200.0);
        assert_eq!(samples.last().unwrap().t, 300.0);
        assert_eq!(samples.len(), 11);
    }

    #[test]
    fn test_max_points_cap() {
        let mut buffer = TraceBuffer::with_max_points(Retention::Full, 4);
        for i in 0..10 {
            buffer.push(i as f64, 0.0);
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.to_vec()[0].t, 6.0);
    }

    #[test]
    fn test_stats() {
        let mut buffer = TraceBuffer::new(Retention::Full);
        buffer.push(0.0, 0.0);
        buffer.push(10.0, 2.0);
        buffer.push(20.0, 1.0);

        let stats = buffer.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.max, 2.0);
        assert_eq!(stats.peak_time, 10.0);
        assert!((stats.mean - 1.0).abs() < 1e-12);
        assert_eq!(stats.peak_to_peak, 2.0);

        let empty = TraceBuffer::new(Retention::Full).stats();
        assert_eq!(empty.count, 0);
    }

    #[test]
    fn test_since_and_slice() {
        let mut buffer = TraceBuffer::new(Retention::Full);
        for i in 0..5 {
            buffer.push(i as f64 * 10.0, i as f64);
        }
        assert_eq!(buffer.since(20.0).len(), 2);
        assert_eq!(buffer.slice_time(10.0, 30.0).len(), 3);
    }
}
