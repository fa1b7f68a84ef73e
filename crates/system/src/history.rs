use chrono::{DateTime, Duration, Utc};
use cpumon_core::UtilizationSample;
use std::collections::VecDeque;

/// Rolling, time-bounded history of one series, the data behind one chart line.
///
/// Samples are strictly increasing by timestamp and the span between the
/// oldest and newest never exceeds `window`.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<UtilizationSample>,
    window:  Duration,
}

impl HistoryBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Append a sample and evict whatever fell out of the window.
    ///
    /// A sample not strictly newer than the current newest is rejected and
    /// `false` is returned; history is never reordered.
    pub fn append(&mut self, sample: UtilizationSample) -> bool {
        if self.newest().is_some_and(|n| sample.timestamp <= n.timestamp) {
            return false;
        }
        self.samples.push_back(sample);
        self.evict();
        true
    }

    /// Copy of the samples, oldest first.
    pub fn snapshot(&self) -> Vec<UtilizationSample> {
        self.samples.iter().copied().collect()
    }

    /// Drop every sample; the window is unchanged.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change the window. Shrinking evicts immediately; growing cannot bring
    /// back samples that were already evicted.
    pub fn resize(&mut self, window: Duration) {
        self.window = window;
        self.evict();
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn newest(&self) -> Option<&UtilizationSample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&UtilizationSample> {
        self.samples.front()
    }

    fn evict(&mut self) {
        let Some(newest) = self.newest().map(|s| s.timestamp) else {
            return;
        };
        while self.oldest().is_some_and(|o| exceeds(newest, o.timestamp, self.window)) {
            self.samples.pop_front();
        }
    }
}

fn exceeds(newest: DateTime<Utc>, oldest: DateTime<Utc>, window: Duration) -> bool {
    newest - oldest > window
}
