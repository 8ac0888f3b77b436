use std::time::Duration;

use crate::group::TickGroup;

/// What one scheduler frame did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Frame counter from the frame's `TickContext`.
    pub frame: u32,
    /// Tick functions executed this frame.
    pub executed: usize,
    /// Tick functions executed per group, indexed by `TickGroup::index`.
    pub per_group: [usize; TickGroup::COUNT],
    /// Wall time spent sorting and executing.
    pub duration: Duration,
}

impl FrameStats {
    pub fn executed_in(&self, group: TickGroup) -> usize {
        self.per_group[group.index()]
    }
}

/// Rolling window of frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    history: Vec<Duration>,
    next: usize,
    filled: bool,
}

impl FrameTimer {
    /// Keep the last `window` samples (at least one).
    pub fn new(window: usize) -> Self {
        Self {
            history: vec![Duration::ZERO; window.max(1)],
            next: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.next] = dt;
        self.next = (self.next + 1) % self.history.len();
        if self.next == 0 {
            self.filled = true;
        }
    }

    fn samples(&self) -> &[Duration] {
        if self.filled {
            &self.history
        } else {
            &self.history[..self.next]
        }
    }

    pub fn count(&self) -> usize {
        self.samples().len()
    }

    pub fn average(&self) -> Duration {
        let samples = self.samples();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        samples.iter().sum::<Duration>() / samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples().iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.samples().iter().copied().min().unwrap_or_default()
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(120)
    }
}
