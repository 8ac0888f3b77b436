use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-unique identifier of a mirrored object.
///
/// `0` is reserved: a reference field holding it points at nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// The reserved "no object" id.
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Map the wire representation of a reference field to an optional id.
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one of the engine's frame loops.
///
/// Serialized as a single byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u8);

impl ThreadId {
    pub const GAME: Self = Self(0);
    pub const RENDER: Self = Self(1);
    pub const PHYSICS: Self = Self(2);

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "game",
            1 => "render",
            2 => "physics",
            _ => "worker",
        }
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// Hands out instance ids. One allocator is shared (behind an `Arc`) by every
/// thread that creates origins, so ids are unique across the process.
///
/// Ids are monotonic and never reused.
#[derive(Debug)]
pub struct InstanceIdAllocator {
    first: u32,
    next: AtomicU32,
}

impl InstanceIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first`. Zero is bumped to 1.
    pub fn starting_at(first: u32) -> Self {
        let first = first.max(1);
        Self {
            first,
            next: AtomicU32::new(first),
        }
    }

    /// Allocate the next id, or `None` once the id space is used up.
    pub fn allocate(&self) -> Option<InstanceId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1))
            .ok()
            .map(InstanceId)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed) - self.first
    }
}

impl Default for InstanceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique_and_monotonic() {
        let ids = InstanceIdAllocator::new();
        let a = ids.allocate().unwrap();
        let b = ids.allocate().unwrap();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(!a.is_none());
        assert_eq!(ids.allocated(), 2);
    }

    #[test]
    fn exhausted_allocator_never_wraps() {
        let ids = InstanceIdAllocator::starting_at(u32::MAX - 2);
        assert_eq!(ids.allocate(), Some(InstanceId(u32::MAX - 2)));
        assert_eq!(ids.allocate(), Some(InstanceId(u32::MAX - 1)));
        assert_eq!(ids.allocate(), None);
        assert_eq!(ids.allocate(), None);
        assert_eq!(ids.allocated(), 2);
        assert_eq!(InstanceIdAllocator::starting_at(0).allocate(), Some(InstanceId(1)));
    }

    #[test]
    fn raw_zero_is_no_reference() {
        assert_eq!(InstanceId::from_raw(0), None);
        assert_eq!(InstanceId::from_raw(7), Some(InstanceId(7)));
    }

    #[test]
    fn allocator_is_shared_across_threads() {
        let ids = std::sync::Arc::new(InstanceIdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.allocate().unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<InstanceId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn thread_names() {
        assert_eq!(ThreadId::RENDER.name(), "render");
        assert_eq!(ThreadId(9).to_string(), "worker(9)");
    }
}
