//! Per-thread tick scheduler: orders a thread's frame work by group and by
//! declared dependencies, then runs it.
//!
//! # Invariants
//! - Groups run strictly in `TickGroup::ALL` order.
//! - Within a frame, an enforced dependency runs before its dependent.
//! - A dependency is enforced only when its group is the same as or earlier
//!   than the dependent's group.
//! - Each enabled function runs exactly once per successful frame.
//! - A dependency cycle among enabled functions fails the frame before any
//!   function runs.

mod group;
mod scheduler;
mod stats;

pub use group::TickGroup;
pub use scheduler::{TickError, TickFunction, TickId, TickScheduler, TickState};
pub use stats::{FrameStats, FrameTimer};
