//! Block headers stored inline in the arena.
//!
//! Every raw read or write of a header goes through [`BlockPtr`]. A
//! `BlockPtr` is only produced by its `unsafe` constructors, whose callers
//! vouch that the address holds (or is about to hold) a header inside the
//! arena. The heap drops a handle as soon as the header is absorbed by a
//! merge or returned to the arena, so the accessors themselves are safe.

use std::{mem, ptr, ptr::NonNull};

use crate::align::ALIGNMENT;

/// Availability of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
  Free,
  Busy,
}

#[repr(C)]
pub(crate) struct Header {
  next: *mut Header,
  size: usize,
  state: State,
}

/// Bytes taken by the header in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<Header>() <= ALIGNMENT);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockPtr(NonNull<Header>);

impl BlockPtr {
  /// Writes a new header at `addr`.
  ///
  /// # Safety
  ///
  /// `addr` must be 8-byte aligned and `HEADER_SIZE + size` bytes starting at
  /// `addr` must lie inside memory granted by the arena and not be part of
  /// any live payload.
  pub unsafe fn init(
    addr: NonNull<u8>,
    size: usize,
    state: State,
    next: Option<BlockPtr>,
  ) -> Self {
    let header = addr.cast::<Header>();

    unsafe {
      header.as_ptr().write(Header {
        next: Self::raw(next),
        size,
        state,
      });
    }

    Self(header)
  }

  /// Recovers the header in front of a payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by the heap that owns the header and
  /// the header must not have been destroyed by a merge or a shrink.
  pub unsafe fn from_payload(
    payload: NonNull<u8>,
  ) -> Self {
    Self(unsafe { payload.sub(HEADER_SIZE) }.cast())
  }

  pub fn size(self) -> usize {
    unsafe { (*self.0.as_ptr()).size }
  }

  pub fn set_size(
    self,
    size: usize,
  ) {
    unsafe { (*self.0.as_ptr()).size = size }
  }

  pub fn state(self) -> State {
    unsafe { (*self.0.as_ptr()).state }
  }

  pub fn set_state(
    self,
    state: State,
  ) {
    unsafe { (*self.0.as_ptr()).state = state }
  }

  pub fn is_free(self) -> bool {
    self.state() == State::Free
  }

  pub fn next(self) -> Option<BlockPtr> {
    NonNull::new(unsafe { (*self.0.as_ptr()).next }).map(Self)
  }

  pub fn set_next(
    self,
    next: Option<BlockPtr>,
  ) {
    unsafe { (*self.0.as_ptr()).next = Self::raw(next) }
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub fn payload(self) -> NonNull<u8> {
    unsafe { self.0.cast::<u8>().add(HEADER_SIZE) }
  }

  /// First byte past the payload, where the next header lives.
  pub fn end(self) -> NonNull<u8> {
    unsafe { self.payload().add(self.size()) }
  }

  /// Moves this header `delta` bytes forward, shrinking the payload by the
  /// same amount. The old and new header locations may overlap.
  ///
  /// # Safety
  ///
  /// `delta` must be a multiple of 8 and smaller than `self.size()`.
  pub unsafe fn shift_forward(
    self,
    delta: usize,
  ) -> BlockPtr {
    let next = self.next();
    let size = self.size();
    let state = self.state();

    unsafe { Self::init(self.0.cast::<u8>().add(delta), size - delta, state, next) }
  }

  /// Zeroes payload bytes in `from..to`.
  ///
  /// # Safety
  ///
  /// `from <= to <= self.size()`.
  pub unsafe fn zero(
    self,
    from: usize,
    to: usize,
  ) {
    unsafe { ptr::write_bytes(self.payload().as_ptr().add(from), 0, to - from) }
  }

  fn raw(
    block: Option<BlockPtr>,
  ) -> *mut Header {
    block.map_or(ptr::null_mut(), |block| block.0.as_ptr())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch() -> Vec<u64> {
    vec![0u64; 64]
  }

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
    assert!(HEADER_SIZE >= mem::size_of::<usize>() * 2);
  }

  #[test]
  fn test_payload_round_trip() {
    let mut buf = scratch();
    let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();

    unsafe {
      let block = BlockPtr::init(base, 128, State::Busy, None);

      assert_eq!(block.payload().as_ptr(), base.as_ptr().add(HEADER_SIZE));
      assert_eq!(BlockPtr::from_payload(block.payload()), block);
      assert_eq!(block.end().as_ptr(), base.as_ptr().add(HEADER_SIZE + 128));
      assert_eq!(block.size(), 128);
      assert_eq!(block.state(), State::Busy);
      assert!(block.next().is_none());
    }
  }

  #[test]
  fn test_shift_forward_keeps_links() {
    let mut buf = scratch();
    let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();

    unsafe {
      let tail = BlockPtr::init(base.add(256), 64, State::Busy, None);
      let block = BlockPtr::init(base, 256 - HEADER_SIZE, State::Free, Some(tail));

      let moved = block.shift_forward(16);

      assert_eq!(moved.addr(), block.addr() + 16);
      assert_eq!(moved.size(), 256 - HEADER_SIZE - 16);
      assert_eq!(moved.state(), State::Free);
      assert_eq!(moved.next(), Some(tail));
      assert_eq!(moved.end(), base.add(256));
    }
  }

  #[test]
  fn test_zero_range() {
    let mut buf = scratch();
    let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();

    unsafe {
      let block = BlockPtr::init(base, 64, State::Busy, None);
      ptr::write_bytes(block.payload().as_ptr(), 0xAB, 64);

      block.zero(16, 48);

      let bytes = std::slice::from_raw_parts(block.payload().as_ptr(), 64);
      assert!(bytes[..16].iter().all(|&b| b == 0xAB));
      assert!(bytes[16..48].iter().all(|&b| b == 0));
      assert!(bytes[48..].iter().all(|&b| b == 0xAB));
    }
  }
}
