use log::{debug, trace};

use crate::{
  arena::Arena,
  block::{BlockPtr, HEADER_SIZE, State},
  error::ArenaError,
  heap::Heap,
};

impl<A: Arena> Heap<A> {
  /// Marks `block` busy and, when the leftover can host a header, splits the
  /// leftover off as a new free block right behind the first `size` bytes.
  ///
  /// A leftover too small for a header stays attached to `block` as padding.
  ///
  /// # Safety
  ///
  /// `block` must be a free block of this heap with `block.size() >= size`,
  /// and `size` a multiple of 8.
  pub(crate) unsafe fn carve(
    &mut self,
    block: BlockPtr,
    size: usize,
  ) {
    block.set_state(State::Busy);

    let leftover = block.size() - size;

    if leftover > HEADER_SIZE {
      let rest = unsafe {
        BlockPtr::init(
          block.payload().add(size),
          leftover - HEADER_SIZE,
          State::Free,
          block.next(),
        )
      };

      block.set_size(size);
      block.set_next(Some(rest));

      trace!("carved {} bytes, {} bytes left free", size, rest.size());
    }
  }

  /// Merges every pair of neighbouring free blocks, then hands whole steps
  /// back to the arena while the free tail is larger than one step.
  ///
  /// Fails only when the arena refuses a shrink; the chain is intact either
  /// way.
  ///
  /// # Safety
  ///
  /// The chain must be intact.
  pub(crate) unsafe fn coalesce(&mut self) -> Result<(), ArenaError> {
    let Some(mut current) = self.root else {
      return Ok(());
    };

    while let Some(next) = current.next() {
      debug_assert_eq!(current.end().as_ptr() as usize, next.addr());

      if current.is_free() && next.is_free() {
        current.set_size(current.size() + next.size() + HEADER_SIZE);
        current.set_next(next.next());

        trace!("merged block at {:#x} into {:#x}", next.addr(), current.addr());
        // Stay put: the new neighbour may be free too.
        continue;
      }

      current = next;
    }

    unsafe { self.release_tail(current) }
  }

  /// Gives steps back to the arena while `tail` is free and larger than one
  /// step. Stops at the first step the arena refuses and returns its error.
  ///
  /// # Safety
  ///
  /// `tail` must be the last block of the chain.
  pub(crate) unsafe fn release_tail(
    &mut self,
    tail: BlockPtr,
  ) -> Result<(), ArenaError> {
    let step = self.config.step;

    while tail.is_free() && tail.size() > step {
      unsafe { self.arena.shrink(step)? };

      tail.set_size(tail.size() - step);
      self.high_water = unsafe { self.high_water.sub(step) };
      self.block_count -= 1;

      debug!(
        "shrank arena by {} bytes, high-water mark = {:?}, blocks = {}",
        step, self.high_water, self.block_count
      );
    }

    Ok(())
  }

  /// Grows a busy block to `new_size` by taking the front of the free block
  /// behind it. Returns `false`, changing nothing, when there is no such
  /// block or it has no more than the missing bytes.
  ///
  /// Bytes past the old size are zeroed.
  ///
  /// # Safety
  ///
  /// `block` must be a busy block of this heap, `new_size` a multiple of 8
  /// larger than its size.
  pub(crate) unsafe fn grow_in_place(
    &mut self,
    block: BlockPtr,
    new_size: usize,
  ) -> bool {
    let old_size = block.size();
    let delta = new_size - old_size;

    let Some(next) = block.next() else {
      return false;
    };

    if !next.is_free() || next.size() <= delta {
      return false;
    }

    let moved = unsafe { next.shift_forward(delta) };

    block.set_next(Some(moved));
    block.set_size(new_size);
    unsafe { block.zero(old_size, new_size) };

    trace!("grew block at {:#x} in place by {} bytes", block.addr(), delta);

    true
  }
}
