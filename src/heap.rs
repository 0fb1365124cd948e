use std::ptr::{self, NonNull};

use log::{debug, warn};

use crate::{
  align::{ALIGNMENT, checked_align},
  arena::Arena,
  block::{BlockPtr, HEADER_SIZE, State},
  config::HeapConfig,
  error::{AllocError, ArenaError, ConfigError},
};

/// A first-fit free-list heap over a single growable arena.
///
/// The heap owns the chain of block headers, the arena's high-water mark and
/// the number of growth steps currently held. Nothing is set up until the
/// first allocation. All operations take `&mut self`; wrap the heap in a
/// lock (see [`GlobalHeap`](crate::GlobalHeap)) to share it.
///
/// When the arena refuses to take memory back, the heap keeps going and
/// remembers the refusal until [`Heap::take_refused_shrink`] collects it.
/// The pointer-returning methods log it as a warning before they return.
pub struct Heap<A: Arena> {
  pub(crate) arena: A,
  pub(crate) config: HeapConfig,
  pub(crate) root: Option<BlockPtr>,
  pub(crate) high_water: *mut u8,
  pub(crate) block_count: usize,
  pub(crate) refused: Option<ArenaError>,
}

// The heap exclusively owns every header it points at.
unsafe impl<A: Arena + Send> Send for Heap<A> {}

impl<A: Arena> Heap<A> {
  /// Creates an uninitialised heap with the default 33-page growth step.
  pub const fn new(
    arena: A,
  ) -> Self {
    Self {
      arena,
      config: HeapConfig::DEFAULT,
      root: None,
      high_water: ptr::null_mut(),
      block_count: 0,
      refused: None,
    }
  }

  pub fn with_config(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self, ConfigError> {
    Ok(Self {
      config: config.validate()?,
      ..Self::new(arena)
    })
  }

  pub fn config(&self) -> HeapConfig {
    self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Growth steps currently held from the arena.
  pub fn block_count(&self) -> usize {
    self.block_count
  }

  /// End of the memory obtained from the arena; null before the first
  /// allocation.
  pub fn high_water(&self) -> *const u8 {
    self.high_water
  }

  /// Largest request the heap accepts.
  pub fn max_request(&self) -> usize {
    isize::MAX as usize - self.config.step - HEADER_SIZE
  }

  /// The last refusal of the arena to take memory back, if one happened
  /// since the previous call.
  pub fn take_refused_shrink(&mut self) -> Option<ArenaError> {
    self.refused.take()
  }

  fn warn_refused_shrink(&mut self) {
    if let Some(err) = self.refused.take() {
      warn!("could not hand memory back to the arena: {}", err);
    }
  }

  fn root(&mut self) -> Result<BlockPtr, AllocError> {
    match self.root {
      Some(root) => Ok(root),
      None => self.init(),
    }
  }

  fn init(&mut self) -> Result<BlockPtr, AllocError> {
    let step = self.config.step;
    let region = unsafe { self.arena.grow(step)? };

    let addr = region.as_ptr() as usize;

    if addr % ALIGNMENT != 0 {
      if let Err(err) = unsafe { self.arena.shrink(step) } {
        self.refused = Some(err);
      }

      return Err(ArenaError::Misaligned { addr, align: ALIGNMENT }.into());
    }

    let root = unsafe { BlockPtr::init(region, step - HEADER_SIZE, State::Free, None) };

    self.root = Some(root);
    self.high_water = unsafe { region.as_ptr().add(step) };
    self.block_count = 1;

    debug!("heap initialised at {:?} with {} bytes", region, step);

    Ok(root)
  }

  /// Allocates `size` bytes, rounded up to a multiple of 8.
  ///
  /// Zero-byte requests succeed and yield a unique pointer with no usable
  /// bytes.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let aligned = checked_align(size)
      .filter(|&aligned| aligned <= self.max_request())
      .ok_or(AllocError::SizeOverflow { size })?;

    let root = self.root()?;
    let block = unsafe { self.find_free_block(root, aligned)? };
    unsafe { self.carve(block, aligned) };

    Ok(block.payload())
  }

  /// Like [`Heap::try_allocate`], returning null on failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    let result = self.try_allocate(size);
    self.warn_refused_shrink();

    match result {
      Ok(payload) => payload.as_ptr(),
      Err(err) => {
        debug!("allocation of {} bytes failed: {}", size, err);
        ptr::null_mut()
      }
    }
  }

  /// Allocates room for `count` elements of `elem_size` bytes, all zeroed.
  pub fn try_zero_allocate(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if count == 0 || elem_size == 0 {
      return Err(AllocError::ZeroSized);
    }

    let size = count
      .checked_mul(elem_size)
      .ok_or(AllocError::SizeOverflow { size: usize::MAX })?;

    let payload = self.try_allocate(size)?;

    unsafe {
      let block = BlockPtr::from_payload(payload);
      block.zero(0, block.size());
    }

    Ok(payload)
  }

  /// Like [`Heap::try_zero_allocate`], returning null on failure.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    let result = self.try_zero_allocate(count, elem_size);
    self.warn_refused_shrink();

    match result {
      Ok(payload) => payload.as_ptr(),
      Err(err) => {
        debug!("zeroed allocation of {} x {} bytes failed: {}", count, elem_size, err);
        ptr::null_mut()
      }
    }
  }

  /// Resizes the block behind `ptr`.
  ///
  /// A null `ptr` allocates; a zero `new_size` releases the block and returns
  /// `Ok(None)`. Shrinking returns `ptr` untouched. Growing first tries to
  /// take the bytes from a free block directly behind, otherwise the payload
  /// is copied to a fresh block. Bytes past the old size are zeroed either
  /// way. On failure the old block is left as it was.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this heap.
  pub unsafe fn try_reallocate(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(payload) = NonNull::new(ptr) else {
      return self.try_allocate(new_size).map(Some);
    };

    if new_size == 0 {
      unsafe { self.try_deallocate(ptr)? };
      return Ok(None);
    }

    let new_size = checked_align(new_size)
      .filter(|&aligned| aligned <= self.max_request())
      .ok_or(AllocError::SizeOverflow { size: new_size })?;

    let block = unsafe { BlockPtr::from_payload(payload) };
    let old_size = block.size();

    if new_size <= old_size {
      return Ok(Some(payload));
    }

    if unsafe { self.grow_in_place(block, new_size) } {
      return Ok(Some(payload));
    }

    let fresh = self.try_allocate(new_size)?;

    unsafe {
      ptr::copy_nonoverlapping(payload.as_ptr(), fresh.as_ptr(), old_size);
      BlockPtr::from_payload(fresh).zero(old_size, new_size);
      self.release(block);
    }

    Ok(Some(fresh))
  }

  /// Like [`Heap::try_reallocate`], returning null on failure or release.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this heap.
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    let result = unsafe { self.try_reallocate(ptr, new_size) };
    self.warn_refused_shrink();

    match result {
      Ok(payload) => payload.map_or(ptr::null_mut(), NonNull::as_ptr),
      Err(err @ AllocError::DoubleFree { .. }) => {
        warn!("{}", err);
        ptr::null_mut()
      }
      Err(err) => {
        debug!("reallocation of {:?} to {} bytes failed: {}", ptr, new_size, err);
        ptr::null_mut()
      }
    }
  }

  /// Releases the block behind `ptr` and merges free neighbours.
  ///
  /// Null is ignored. Releasing a block that is already free reports
  /// [`AllocError::DoubleFree`] and changes nothing.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this heap whose header has
  /// not since been reused for another block.
  pub unsafe fn try_deallocate(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    let Some(payload) = NonNull::new(ptr) else {
      return Ok(());
    };

    let block = unsafe { BlockPtr::from_payload(payload) };

    if block.is_free() {
      return Err(AllocError::DoubleFree { addr: ptr as usize });
    }

    unsafe { self.release(block) };

    Ok(())
  }

  /// Like [`Heap::try_deallocate`], logging a double release or a refused
  /// shrink as a warning.
  ///
  /// # Safety
  ///
  /// See [`Heap::try_deallocate`].
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    let result = unsafe { self.try_deallocate(ptr) };
    self.warn_refused_shrink();

    if let Err(err) = result {
      warn!("{}", err);
    }
  }

  /// Usable bytes behind a live pointer.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live pointer returned by this heap.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { BlockPtr::from_payload(ptr) }.size()
  }

  unsafe fn release(
    &mut self,
    block: BlockPtr,
  ) {
    block.set_state(State::Free);

    if let Err(err) = unsafe { self.coalesce() } {
      self.refused = Some(err);
    }
  }
}


#[cfg(test)]
mod properties {
  use proptest::prelude::*;

  use super::*;
  use crate::{align, arena::BufferArena};

  const STEP: usize = 4096;

  fn heap() -> Heap<BufferArena> {
    Heap::with_config(BufferArena::with_capacity(4 * STEP), HeapConfig::with_step(STEP)).unwrap()
  }

  proptest! {
    #[test]
    fn allocation_is_smallest_multiple_of_eight(size in 0usize..3000) {
      let mut heap = heap();

      let ptr = heap.try_allocate(size).unwrap();

      prop_assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
      prop_assert_eq!(unsafe { heap.usable_size(ptr) }, align!(size));
    }

    #[test]
    fn zero_allocate_reads_zero(count in 1usize..64, elem_size in 1usize..64) {
      let mut heap = heap();

      let dirty = heap.allocate(count * elem_size);
      unsafe {
        ptr::write_bytes(dirty, 0xFF, count * elem_size);
        heap.deallocate(dirty);
      }

      let clean = heap.try_zero_allocate(count, elem_size).unwrap();
      let len = unsafe { heap.usable_size(clean) };
      let bytes = unsafe { std::slice::from_raw_parts(clean.as_ptr(), len) };

      prop_assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn release_in_any_order_restores_one_block(
      sizes in proptest::collection::vec(1usize..256, 1..12),
      order in any::<prop::sample::Index>()
    ) {
      let mut heap = heap();

      let mut ptrs: Vec<_> = sizes.iter().map(|&size| heap.allocate(size)).collect();
      let start = order.index(ptrs.len());
      ptrs.rotate_left(start);

      for ptr in ptrs {
        unsafe { heap.deallocate(ptr) };
      }

      let blocks: Vec<_> = heap.blocks().collect();
      prop_assert_eq!(blocks.len(), 1);
      prop_assert_eq!(blocks[0].state, State::Free);
      prop_assert_eq!(blocks[0].size, STEP - HEADER_SIZE);
      prop_assert_eq!(heap.block_count(), 1);
    }
  }
}
