//! The legacy shared-memory dispenser protocol.
//!
//! Two separate processes exchange a fixed-size array of `i32` type codes
//! through a System V shared-memory segment: the producer (`shm-dispense`)
//! writes one code per dispenser slot each interval, the watcher
//! (`shm-watch`) polls and prints them. This is a demo of the wire protocol
//! only — the real simulation pipeline is in-process (the `kitline` crate).

use std::io;
use std::ptr;

/// Well-known key both processes agree on.
pub const SHM_KEY: libc::key_t = 2222;

/// Slot code: no part dispensed this interval.
pub const EMPTY: i32 = 0;

/// Slot code: end of stream, the producer is done.
pub const END_OF_STREAM: i32 = -1;

/// Number of part kinds; slot codes `1..=KINDS` name a kind.
pub const KINDS: usize = 4;

/// Label for a slot code, for printing.
pub fn code_label(code: i32) -> &'static str {
    match code {
        END_OF_STREAM => "eos",
        EMPTY => "-",
        1 => "A",
        2 => "B",
        3 => "C",
        4 => "D",
        _ => "?",
    }
}

/// A System V shared-memory segment viewed as an `i32` array.
///
/// The creating side removes the segment when dropped (`IPC_RMID` takes
/// effect once the last process detaches), so demo runs do not leak
/// segments.
#[derive(Debug)]
pub struct Segment {
    id: libc::c_int,
    base: *mut i32,
    slots: usize,
    owner: bool,
}

// The raw pointer targets shared memory valid for the segment's lifetime;
// all access goes through volatile reads/writes.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates (or re-opens) the segment with room for `slots` codes.
    pub fn create(key: libc::key_t, slots: usize) -> io::Result<Self> {
        Self::open(key, slots, libc::IPC_CREAT | 0o666, true)
    }

    /// Attaches to an existing segment.
    pub fn attach(key: libc::key_t, slots: usize) -> io::Result<Self> {
        Self::open(key, slots, 0o666, false)
    }

    fn open(
        key: libc::key_t,
        slots: usize,
        flags: libc::c_int,
        owner: bool,
    ) -> io::Result<Self> {
        let size = slots * std::mem::size_of::<i32>();
        // SAFETY: plain syscalls; the returned id/address are validated
        // before use.
        let id = unsafe { libc::shmget(key, size, flags) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        let base = unsafe { libc::shmat(id, ptr::null(), 0) };
        if base as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            id,
            base: base.cast::<i32>(),
            slots,
            owner,
        })
    }

    /// Number of `i32` slots in the segment.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Writes one slot code.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn write(&self, index: usize, code: i32) {
        assert!(index < self.slots, "slot index {index} out of range");
        // SAFETY: index checked; volatile because the peer polls the slot
        // from another process.
        unsafe { ptr::write_volatile(self.base.add(index), code) }
    }

    /// Reads one slot code.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn read(&self, index: usize) -> i32 {
        assert!(index < self.slots, "slot index {index} out of range");
        // SAFETY: index checked; see `write`.
        unsafe { ptr::read_volatile(self.base.add(index)) }
    }

    /// Writes `code` into every slot.
    pub fn fill(&self, code: i32) {
        for index in 0..self.slots {
            self.write(index, code);
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: base came from a successful shmat; id from shmget.
        unsafe {
            libc::shmdt(self.base.cast::<libc::c_void>());
            if self.owner {
                libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_labels() {
        assert_eq!(code_label(END_OF_STREAM), "eos");
        assert_eq!(code_label(EMPTY), "-");
        assert_eq!(code_label(3), "C");
        assert_eq!(code_label(9), "?");
    }

    #[test]
    fn segment_round_trip() {
        // A private key so parallel test runs cannot collide.
        let key = 0x4b54_0000 + i32::from(std::process::id() as u16);
        let segment = Segment::create(key, 4).unwrap();
        segment.fill(EMPTY);

        let peer = Segment::attach(key, 4).unwrap();
        segment.write(2, 3);
        assert_eq!(peer.read(2), 3);
        assert_eq!(peer.read(0), EMPTY);

        segment.fill(END_OF_STREAM);
        assert!((0..4).all(|i| peer.read(i) == END_OF_STREAM));
    }
}
