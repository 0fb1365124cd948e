//! A process-wide heap on the program break.
//!
//! [`GlobalHeap`] puts a [`Heap`] behind one spin lock so it can live in a
//! `static` and serve as the `#[global_allocator]`. A spin lock is used
//! because a parking lock may allocate while parking. Every operation holds
//! the lock for its whole duration: splitting, merging and growth all touch
//! the shared chain.
//!
//! The crate keeps one such heap on the program break, reachable through the
//! free functions of this module and through [`ProcessHeap`]:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: brkheap::ProcessHeap = brkheap::ProcessHeap;
//! ```
//!
//! When the heap is the global allocator, the installed logger must not
//! allocate while recording `debug` or `trace` records of growth, shrink
//! and carving, as those are emitted with the lock held. The outcome of each
//! operation (double releases, refused shrinks, failed requests) is logged
//! after the lock is dropped.

use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
};

use log::{debug, warn};
use spin::Mutex;

use crate::{
  align::ALIGNMENT,
  arena::{Arena, SbrkArena},
  dump::{BlockInfo, HeapStats},
  error::{AllocError, ArenaError},
  heap::Heap,
};

/// A [`Heap`] shared behind a single lock.
pub struct GlobalHeap<A: Arena = SbrkArena> {
  heap: Mutex<Heap<A>>,
}

impl<A: Arena> GlobalHeap<A> {
  pub const fn new(
    arena: A,
  ) -> Self {
    Self {
      heap: Mutex::new(Heap::new(arena)),
    }
  }

  pub fn from_heap(
    heap: Heap<A>,
  ) -> Self {
    Self {
      heap: Mutex::new(heap),
    }
  }

  /// Runs `op` under the lock, then logs its outcome once the lock is
  /// released.
  fn locked<T>(
    &self,
    op: impl FnOnce(&mut Heap<A>) -> Result<T, AllocError>,
  ) -> Option<T> {
    let (result, refused) = {
      let mut heap = self.heap.lock();
      let result = op(&mut *heap);
      (result, heap.take_refused_shrink())
    };

    report(result, refused)
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    self
      .locked(|heap| heap.try_allocate(size))
      .map_or(ptr::null_mut(), |payload| payload.as_ptr())
  }

  pub fn zero_allocate(
    &self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    self
      .locked(|heap| heap.try_zero_allocate(count, elem_size))
      .map_or(ptr::null_mut(), |payload| payload.as_ptr())
  }

  /// # Safety
  ///
  /// See [`Heap::try_reallocate`].
  pub unsafe fn reallocate(
    &self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    self
      .locked(|heap| unsafe { heap.try_reallocate(ptr, new_size) })
      .flatten()
      .map_or(ptr::null_mut(), |payload| payload.as_ptr())
  }

  /// # Safety
  ///
  /// See [`Heap::try_deallocate`].
  pub unsafe fn deallocate(
    &self,
    ptr: *mut u8,
  ) {
    self.locked(|heap| unsafe { heap.try_deallocate(ptr) });
  }

  pub fn stats(&self) -> HeapStats {
    self.heap.lock().stats()
  }

  /// See [`Heap::snapshot`].
  pub fn snapshot(
    &self,
    out: &mut [BlockInfo],
  ) -> usize {
    self.heap.lock().snapshot(out)
  }
}

fn report<T>(
  result: Result<T, AllocError>,
  refused: Option<ArenaError>,
) -> Option<T> {
  if let Some(err) = refused {
    warn!("could not hand memory back to the arena: {}", err);
  }

  match result {
    Ok(value) => Some(value),
    Err(err @ AllocError::DoubleFree { .. }) => {
      warn!("{}", err);
      None
    }
    Err(err) => {
      debug!("heap request failed: {}", err);
      None
    }
  }
}

unsafe impl<A: Arena + Send> GlobalAlloc for GlobalHeap<A> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self.allocate(layout.size())
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    match layout.size() {
      0 => self.allocate(0),
      size => self.zero_allocate(size, 1),
    }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.deallocate(ptr) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { self.reallocate(ptr, new_size) }
  }
}

static PROCESS_HEAP: GlobalHeap = GlobalHeap::new(SbrkArena::new());

/// Handle to the crate's process-wide heap, usable as `#[global_allocator]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHeap;

unsafe impl GlobalAlloc for ProcessHeap {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    unsafe { PROCESS_HEAP.alloc(layout) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    unsafe { PROCESS_HEAP.alloc_zeroed(layout) }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    unsafe { PROCESS_HEAP.dealloc(ptr, layout) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { PROCESS_HEAP.realloc(ptr, layout, new_size) }
  }
}

/// Allocates from the process-wide heap; null on failure.
pub fn allocate(
  size: usize,
) -> *mut u8 {
  PROCESS_HEAP.allocate(size)
}

/// Zeroed allocation from the process-wide heap; null on failure or when
/// either argument is zero.
pub fn zero_allocate(
  count: usize,
  elem_size: usize,
) -> *mut u8 {
  PROCESS_HEAP.zero_allocate(count, elem_size)
}

/// # Safety
///
/// `ptr` must be null or a live pointer from the process-wide heap.
pub unsafe fn reallocate(
  ptr: *mut u8,
  new_size: usize,
) -> *mut u8 {
  unsafe { PROCESS_HEAP.reallocate(ptr, new_size) }
}

/// # Safety
///
/// `ptr` must be null or a pointer from the process-wide heap.
pub unsafe fn deallocate(
  ptr: *mut u8,
) {
  unsafe { PROCESS_HEAP.deallocate(ptr) }
}

pub fn stats() -> HeapStats {
  PROCESS_HEAP.stats()
}

pub fn snapshot(
  out: &mut [BlockInfo],
) -> usize {
  PROCESS_HEAP.snapshot(out)
}

/// C entry points replacing the libc allocator in the final link.
#[cfg(feature = "override")]
mod exports {
  use libc::{c_void, size_t};

  #[unsafe(no_mangle)]
  pub extern "C" fn malloc(
    size: size_t,
  ) -> *mut c_void {
    super::allocate(size).cast()
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn calloc(
    count: size_t,
    elem_size: size_t,
  ) -> *mut c_void {
    super::zero_allocate(count, elem_size).cast()
  }

  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn realloc(
    ptr: *mut c_void,
    size: size_t,
  ) -> *mut c_void {
    unsafe { super::reallocate(ptr.cast(), size) }.cast()
  }

  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn free(
    ptr: *mut c_void,
  ) {
    unsafe { super::deallocate(ptr.cast()) }
  }
}
