//! Sources of raw memory for the heap.
//!
//! An arena is a single contiguous region whose high-water mark only moves at
//! its tail. The heap asks for whole growth steps and gives them back from
//! the tail once they are free again.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::debug;

use crate::{align::ALIGNMENT, error::ArenaError};

/// A raw memory source with a movable high-water mark.
///
/// # Safety
///
/// Implementors must return regions that are valid for reads and writes of
/// `increment` bytes, are not used by anything else, and start exactly at the
/// previous high-water mark whenever the mark has not been moved by a third
/// party. `shrink` must only ever release bytes at the tail.
pub unsafe trait Arena {
  /// Advances the high-water mark by `increment` bytes and returns the start
  /// of the new region.
  ///
  /// # Safety
  ///
  /// Callers must treat the returned bytes as owned by the caller until they
  /// are handed back with [`Arena::shrink`].
  unsafe fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ArenaError>;

  /// Retracts the high-water mark by `decrement` bytes.
  ///
  /// # Safety
  ///
  /// The last `decrement` bytes below the mark must no longer be referenced.
  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), ArenaError>;
}

fn failed(
  address: *mut c_void,
) -> bool {
  address == usize::MAX as *mut c_void
}

/// The process' program break, moved with `sbrk(2)`.
///
/// The first growth pads the break to an 8-byte boundary. The arena
/// remembers where it left the break and refuses to retract it if someone
/// else has moved it since.
pub struct SbrkArena {
  top: *mut u8,
}

impl SbrkArena {
  pub const fn new() -> Self {
    Self {
      top: ptr::null_mut(),
    }
  }

  unsafe fn align_break(&mut self) -> Result<(), ArenaError> {
    let current = unsafe { sbrk(0) } as usize;
    let pad = current.wrapping_neg() & (ALIGNMENT - 1);

    if pad != 0 && failed(unsafe { sbrk(pad as intptr_t) }) {
      return Err(ArenaError::Exhausted { requested: pad });
    }

    debug!("aligned program break by {} bytes", pad);
    Ok(())
  }
}

impl Default for SbrkArena {
  fn default() -> Self {
    Self::new()
  }
}

// The arena only records where it left the break.
unsafe impl Send for SbrkArena {}

unsafe impl Arena for SbrkArena {
  unsafe fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ArenaError> {
    let delta = intptr_t::try_from(increment).map_err(|_| ArenaError::Exhausted { requested: increment })?;

    if self.top.is_null() {
      unsafe { self.align_break()? };
    }

    let address = unsafe { sbrk(delta) };

    if failed(address) {
      return Err(ArenaError::Exhausted { requested: increment });
    }

    let region = NonNull::new(address.cast::<u8>()).ok_or(ArenaError::Exhausted { requested: increment })?;
    self.top = unsafe { region.as_ptr().add(increment) };

    Ok(region)
  }

  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), ArenaError> {
    let delta = intptr_t::try_from(decrement).map_err(|_| ArenaError::Underflow { requested: decrement })?;
    let current = unsafe { sbrk(0) }.cast::<u8>();

    if current != self.top {
      return Err(ArenaError::Discontiguous {
        expected: self.top as usize,
        found: current as usize,
      });
    }

    if failed(unsafe { sbrk(-delta) }) {
      return Err(ArenaError::Underflow { requested: decrement });
    }

    self.top = unsafe { self.top.sub(decrement) };

    Ok(())
  }
}

/// A fixed-capacity buffer with its own high-water mark.
///
/// Useful where `sbrk` is unavailable or must not be touched, such as inside
/// a test harness whose system allocator already owns the program break.
pub struct BufferArena {
  base: NonNull<u64>,
  words: usize,
  used: usize,
}

impl BufferArena {
  /// Allocates a zeroed, 8-byte aligned buffer of at least `bytes` bytes.
  pub fn with_capacity(
    bytes: usize,
  ) -> Self {
    let words = bytes.div_ceil(ALIGNMENT);
    let buffer: &mut [u64] = Box::leak(vec![0u64; words].into_boxed_slice());

    Self {
      base: NonNull::from(buffer).cast::<u64>(),
      words,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.words * ALIGNMENT
  }

  /// Bytes currently below the high-water mark.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn base(&self) -> *const u8 {
    self.base.as_ptr().cast_const().cast()
  }
}

impl Drop for BufferArena {
  fn drop(&mut self) {
    let slice = ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.words);
    drop(unsafe { Box::from_raw(slice) });
  }
}

// The buffer is exclusively owned.
unsafe impl Send for BufferArena {}

unsafe impl Arena for BufferArena {
  unsafe fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ArenaError> {
    let end = self
      .used
      .checked_add(increment)
      .filter(|&end| end <= self.capacity())
      .ok_or(ArenaError::Exhausted { requested: increment })?;

    let region = unsafe { self.base.cast::<u8>().add(self.used) };
    self.used = end;

    Ok(region)
  }

  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), ArenaError> {
    self.used = self
      .used
      .checked_sub(decrement)
      .ok_or(ArenaError::Underflow { requested: decrement })?;

    Ok(())
  }
}
