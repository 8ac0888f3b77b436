//! # Triple Buffer
//!
//! Three equally-sized byte regions and one atomic flag word. At any instant
//! exactly one region is assigned each role:
//!
//! ```text
//!   writer ──► [write] ──swap_write_buffer──► [temp] ──swap_read_buffer──► [read] ──► reader
//! ```
//!
//! Flag word layout (`u32`):
//!
//! ```text
//!   bits 0-1  read region index
//!   bits 2-3  write region index
//!   bits 4-5  temp region index
//!   bit  6    new data published since the reader last swapped
//! ```
//!
//! Roles only change through the two compare-and-swap transitions, so the
//! writer's region and the reader's region never alias and a reader never
//! sees a half-written frame.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const INDEX_MASK: u32 = 0b11;
const READ_SHIFT: u32 = 0;
const WRITE_SHIFT: u32 = 2;
const TEMP_SHIFT: u32 = 4;
const FRESH_BIT: u32 = 1 << 6;

/// Errors from triple buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Decoded view of the flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRoles {
    pub read: usize,
    pub write: usize,
    pub temp: usize,
    /// A complete snapshot is waiting in the temp region.
    pub fresh: bool,
}

impl BufferRoles {
    /// Regions 0/1/2 assigned read/write/temp, nothing published.
    pub const INITIAL: Self = Self {
        read: 0,
        write: 1,
        temp: 2,
        fresh: false,
    };

    fn unpack(flags: u32) -> Self {
        Self {
            read: ((flags >> READ_SHIFT) & INDEX_MASK) as usize,
            write: ((flags >> WRITE_SHIFT) & INDEX_MASK) as usize,
            temp: ((flags >> TEMP_SHIFT) & INDEX_MASK) as usize,
            fresh: flags & FRESH_BIT != 0,
        }
    }

    fn pack(self) -> u32 {
        ((self.read as u32) << READ_SHIFT)
            | ((self.write as u32) << WRITE_SHIFT)
            | ((self.temp as u32) << TEMP_SHIFT)
            | if self.fresh { FRESH_BIT } else { 0 }
    }
}

struct Shared {
    flags: AtomicU32,
    regions: [UnsafeCell<Box<[u8]>>; 3],
    byte_length: usize,
}

// SAFETY: region access is partitioned by the flag word. The single writer
// only touches the region holding the write role, the single reader only the
// region holding the read role, and roles are reassigned exclusively through
// acquire/release compare-and-swap on `flags`.
unsafe impl Sync for Shared {}

impl Shared {
    fn roles(&self) -> BufferRoles {
        BufferRoles::unpack(self.flags.load(Ordering::Acquire))
    }

    /// Apply `transition` to the flag word until the CAS lands.
    ///
    /// Returns the roles before the transition, or `None` if `transition`
    /// declined.
    fn update(&self, transition: impl Fn(BufferRoles) -> Option<BufferRoles>) -> Option<BufferRoles> {
        self.flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                transition(BufferRoles::unpack(flags)).map(BufferRoles::pack)
            })
            .ok()
            .map(BufferRoles::unpack)
    }
}

/// Namespace for creating a triple buffer channel.
///
/// The channel is split into its two ends: exactly one writer and one reader.
/// Neither end is `Clone`, so the single-producer/single-consumer discipline
/// is enforced by the type system. A thread that wants its own independent
/// view of an origin gets its own triple buffer.
#[derive(Debug)]
pub struct TripleBuffer;

impl TripleBuffer {
    /// Allocate three zeroed regions of `byte_length` bytes.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(byte_length: usize) -> (TripleBufferWriter, TripleBufferReader) {
        let shared = Arc::new(Shared {
            flags: AtomicU32::new(BufferRoles::INITIAL.pack()),
            regions: [
                UnsafeCell::new(vec![0; byte_length].into_boxed_slice()),
                UnsafeCell::new(vec![0; byte_length].into_boxed_slice()),
                UnsafeCell::new(vec![0; byte_length].into_boxed_slice()),
            ],
            byte_length,
        });
        tracing::trace!(byte_length, "triple buffer allocated");
        (
            TripleBufferWriter {
                shared: shared.clone(),
            },
            TripleBufferReader { shared },
        )
    }
}

/// The producing end of a triple buffer.
pub struct TripleBufferWriter {
    shared: Arc<Shared>,
}

impl TripleBufferWriter {
    pub fn byte_length(&self) -> usize {
        self.shared.byte_length
    }

    pub fn roles(&self) -> BufferRoles {
        self.shared.roles()
    }

    /// The region currently assigned the write role.
    pub fn write_buffer(&mut self) -> &mut [u8] {
        let index = self.shared.roles().write;
        // SAFETY: only the writer ever holds the write role, the write index
        // only changes in `swap_write_buffer` (which needs `&mut self`), and
        // `&mut self` here rules out a second live borrow of the region.
        unsafe { &mut (&mut *self.shared.regions[index].get())[..] }
    }

    /// Copy a full snapshot into the write region.
    pub fn copy_to_write_buffer(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let expected = self.byte_length();
        if bytes.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.write_buffer().copy_from_slice(bytes);
        Ok(())
    }

    /// Publish the write region: exchange it with the temp region and mark new
    /// data as available. Never blocks; retries only while the reader is
    /// swapping concurrently.
    pub fn swap_write_buffer(&mut self) {
        self.shared.update(|roles| {
            Some(BufferRoles {
                write: roles.temp,
                temp: roles.write,
                fresh: true,
                ..roles
            })
        });
    }
}

impl std::fmt::Debug for TripleBufferWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleBufferWriter")
            .field("byte_length", &self.shared.byte_length)
            .field("roles", &self.roles())
            .finish()
    }
}

/// The consuming end of a triple buffer.
pub struct TripleBufferReader {
    shared: Arc<Shared>,
}

impl TripleBufferReader {
    pub fn byte_length(&self) -> usize {
        self.shared.byte_length
    }

    pub fn roles(&self) -> BufferRoles {
        self.shared.roles()
    }

    /// Whether a snapshot newer than the read region has been published.
    pub fn has_new_data(&self) -> bool {
        self.shared.roles().fresh
    }

    /// Take the newest complete snapshot, if one was published since the last
    /// call. Returns `false` and keeps the current read region otherwise.
    pub fn swap_read_buffer(&mut self) -> bool {
        self.shared
            .update(|roles| {
                roles.fresh.then_some(BufferRoles {
                    read: roles.temp,
                    temp: roles.read,
                    fresh: false,
                    ..roles
                })
            })
            .is_some()
    }

    /// The region currently assigned the read role.
    pub fn read_buffer(&self) -> &[u8] {
        let index = self.shared.roles().read;
        // SAFETY: the writer never touches the read region, and the read
        // index only changes in `swap_read_buffer`, which needs `&mut self`
        // and so cannot run while this borrow is alive.
        unsafe { &(&*self.shared.regions[index].get())[..] }
    }
}

impl std::fmt::Debug for TripleBufferReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleBufferReader")
            .field("byte_length", &self.shared.byte_length)
            .field("roles", &self.roles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_permutation(roles: BufferRoles) {
        let mut seen = [roles.read, roles.write, roles.temp];
        seen.sort();
        assert_eq!(seen, [0, 1, 2], "{roles:?}");
    }

    #[test]
    fn initial_roles() {
        let (writer, reader) = TripleBuffer::new(16);
        assert_eq!(writer.roles(), BufferRoles::INITIAL);
        assert_eq!(reader.byte_length(), 16);
        assert!(!reader.has_new_data());
        assert!(reader.read_buffer().iter().all(|&b| b == 0));
    }

    #[test]
    fn flag_word_packs_and_unpacks() {
        let roles = BufferRoles {
            read: 2,
            write: 0,
            temp: 1,
            fresh: true,
        };
        assert_eq!(BufferRoles::unpack(roles.pack()), roles);
    }

    #[test]
    fn read_swap_without_publish_is_noop() {
        let (_writer, mut reader) = TripleBuffer::new(4);
        assert!(!reader.swap_read_buffer());
        assert_eq!(reader.roles(), BufferRoles::INITIAL);
    }

    #[test]
    fn publish_then_read() {
        let (mut writer, mut reader) = TripleBuffer::new(4);
        writer.copy_to_write_buffer(&[1, 2, 3, 4]).unwrap();
        writer.swap_write_buffer();
        assert!(reader.has_new_data());

        // Not visible until the reader swaps.
        assert_eq!(reader.read_buffer(), &[0, 0, 0, 0]);
        assert!(reader.swap_read_buffer());
        assert_eq!(reader.read_buffer(), &[1, 2, 3, 4]);
    }

    #[test]
    fn second_read_swap_returns_false_and_keeps_content() {
        let (mut writer, mut reader) = TripleBuffer::new(2);
        writer.copy_to_write_buffer(&[7, 9]).unwrap();
        writer.swap_write_buffer();

        assert!(reader.swap_read_buffer());
        let first = reader.read_buffer().to_vec();
        assert!(!reader.swap_read_buffer());
        assert_eq!(reader.read_buffer(), first.as_slice());
    }

    #[test]
    fn latest_publish_wins() {
        let (mut writer, mut reader) = TripleBuffer::new(1);
        for v in 1..=5u8 {
            writer.copy_to_write_buffer(&[v]).unwrap();
            writer.swap_write_buffer();
        }
        assert!(reader.swap_read_buffer());
        assert_eq!(reader.read_buffer(), &[5]);
    }

    #[test]
    fn roles_stay_a_permutation() {
        let (mut writer, mut reader) = TripleBuffer::new(1);
        for step in 0..50 {
            if step % 3 == 0 {
                reader.swap_read_buffer();
            } else {
                writer.swap_write_buffer();
            }
            let roles = writer.roles();
            assert_permutation(roles);
            assert_ne!(roles.read, roles.write);
        }
    }

    #[test]
    fn length_mismatch_rejected() {
        let (mut writer, _reader) = TripleBuffer::new(4);
        let err = writer.copy_to_write_buffer(&[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            BufferError::LengthMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn zero_length_buffer_is_usable() {
        let (mut writer, mut reader) = TripleBuffer::new(0);
        writer.copy_to_write_buffer(&[]).unwrap();
        writer.swap_write_buffer();
        assert!(reader.swap_read_buffer());
        assert!(reader.read_buffer().is_empty());
    }

    /// The writer fills every slot with the same counter before publishing;
    /// the reader must never see two different counters in one snapshot.
    #[test]
    fn no_torn_reads_under_contention() {
        const SLOTS: usize = 64;
        const FRAMES: u64 = 20_000;
        let (mut writer, mut reader) = TripleBuffer::new(SLOTS * 8);

        std::thread::scope(|s| {
            s.spawn(move || {
                for counter in 1..=FRAMES {
                    for slot in writer.write_buffer().chunks_exact_mut(8) {
                        slot.copy_from_slice(&counter.to_ne_bytes());
                    }
                    writer.swap_write_buffer();
                }
            });

            s.spawn(move || {
                let mut last = 0u64;
                while last < FRAMES {
                    if !reader.swap_read_buffer() {
                        std::hint::spin_loop();
                        continue;
                    }
                    let buf = reader.read_buffer();
                    let first = u64::from_ne_bytes(buf[..8].try_into().unwrap());
                    for slot in buf.chunks_exact(8) {
                        assert_eq!(u64::from_ne_bytes(slot.try_into().unwrap()), first);
                    }
                    assert!(first > last, "snapshots went backwards: {first} after {last}");
                    last = first;
                }
            });
        });
    }
}
