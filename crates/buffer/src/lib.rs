//! Triple Buffer: a fixed-size, lock-free, wait-free snapshot channel between
//! one writer thread and one reader thread.
//!
//! # Invariants
//! - Exactly one region holds each of the read, write and temp roles.
//! - The writer only touches the write region; the reader only the read region.
//! - Role reassignment is a single atomic operation on the flag word.
//! - A reader either sees the previous complete snapshot or the newest complete
//!   one, never a mix.

mod triple;

pub use triple::{BufferError, BufferRoles, TripleBuffer, TripleBufferReader, TripleBufferWriter};
