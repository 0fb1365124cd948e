use std::ptr::NonNull;

use log::debug;

use crate::{
  arena::Arena,
  block::{BlockPtr, HEADER_SIZE, State},
  error::{AllocError, ArenaError},
  heap::Heap,
};

impl<A: Arena> Heap<A> {
  /// Returns the first free block, in address order, holding at least `size`
  /// bytes. When none fits, the arena is grown one step at a time at the tail
  /// until the tail block does.
  ///
  /// The block is returned still free; marking and carving it is up to the
  /// caller.
  ///
  /// # Safety
  ///
  /// `root` must be the heap's first header.
  pub(crate) unsafe fn find_free_block(
    &mut self,
    root: BlockPtr,
    size: usize,
  ) -> Result<BlockPtr, AllocError> {
    let mut current = root;

    loop {
      if current.is_free() && current.size() >= size {
        return Ok(current);
      }

      match current.next() {
        Some(next) => current = next,
        None => break,
      }
    }

    let mut tail = current;

    loop {
      let region = match unsafe { self.extend() } {
        Ok(region) => region,
        Err(err) => {
          // Steps already taken for this request are no use to anyone.
          if let Err(refused) = unsafe { self.release_tail(tail) } {
            self.refused = Some(refused);
          }

          return Err(err.into());
        }
      };

      if tail.is_free() {
        tail.set_size(tail.size() + self.config.step);
      } else {
        let block = unsafe { BlockPtr::init(region, self.config.step - HEADER_SIZE, State::Free, None) };
        tail.set_next(Some(block));
        tail = block;
      }

      if tail.size() >= size {
        return Ok(tail);
      }
    }
  }

  /// Grows the arena by one step directly above the high-water mark.
  ///
  /// A step granted anywhere else is handed straight back and reported as
  /// [`ArenaError::Discontiguous`], whether or not the arena takes it.
  unsafe fn extend(&mut self) -> Result<NonNull<u8>, ArenaError> {
    let step = self.config.step;
    let region = unsafe { self.arena.grow(step)? };

    if region.as_ptr() != self.high_water {
      if let Err(err) = unsafe { self.arena.shrink(step) } {
        self.refused = Some(err);
      }

      return Err(ArenaError::Discontiguous {
        expected: self.high_water as usize,
        found: region.as_ptr() as usize,
      });
    }

    self.high_water = unsafe { region.as_ptr().add(step) };
    self.block_count += 1;

    debug!(
      "grew arena by {} bytes, high-water mark = {:?}, blocks = {}",
      step, self.high_water, self.block_count
    );

    Ok(region)
  }
}
