use serde::{Deserialize, Serialize};

/// Per-frame context handed to every tick function.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickContext {
    /// Monotonic frame counter, starting at 1 for the first frame.
    pub id: u32,
    /// Seconds since the previous frame.
    pub delta: f32,
    /// Seconds since the loop started.
    pub elapsed: f32,
}

/// Produces the `TickContext` for each frame of one thread's loop.
///
/// Every thread owns its own clock; there is no shared clock between loops.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    current: TickContext,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next frame and return its context.
    pub fn advance(&mut self, delta: f32) -> TickContext {
        self.current = TickContext {
            id: self.current.id.wrapping_add(1),
            delta,
            elapsed: self.current.elapsed + delta,
        };
        self.current
    }

    /// Context of the most recent frame (all zeros before the first advance).
    pub fn current(&self) -> TickContext {
        self.current
    }
}
