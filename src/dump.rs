//! Read-only views of the block chain for diagnostics.
//!
//! Nothing here allocates, so the views can be taken while the heap is the
//! process' global allocator.

use std::{fmt, marker::PhantomData, ptr};

use crate::{
  arena::Arena,
  block::{BlockPtr, HEADER_SIZE, State},
  heap::Heap,
};

/// One block of the chain as seen at the time of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Pointer handed to callers for this block.
  pub payload: *mut u8,
  pub size: usize,
  pub state: State,
  /// Payload pointer of the next block by address.
  pub next: Option<*mut u8>,
}

impl BlockInfo {
  fn of(
    block: BlockPtr,
  ) -> Self {
    Self {
      payload: block.payload().as_ptr(),
      size: block.size(),
      state: block.state(),
      next: block.next().map(|next| next.payload().as_ptr()),
    }
  }
}

/// Iterator over the chain in address order.
pub struct Blocks<'a> {
  next: Option<BlockPtr>,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let block = self.next?;
    self.next = block.next();
    Some(BlockInfo::of(block))
  }
}

/// Totals over the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  /// Headers currently in the chain.
  pub blocks: usize,
  /// Growth steps held from the arena.
  pub block_count: usize,
  pub high_water: *const u8,
  pub free_bytes: usize,
  pub busy_bytes: usize,
}

impl<A: Arena> Heap<A> {
  /// Walks the chain in address order. Empty before the first allocation.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      next: self.root,
      _heap: PhantomData,
    }
  }

  /// Payload bytes held by free blocks.
  pub fn free_bytes(&self) -> usize {
    self
      .blocks()
      .filter(|info| info.state == State::Free)
      .map(|info| info.size)
      .sum()
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      blocks: 0,
      block_count: self.block_count,
      high_water: self.high_water,
      free_bytes: 0,
      busy_bytes: 0,
    };

    for info in self.blocks() {
      stats.blocks += 1;
      match info.state {
        State::Free => stats.free_bytes += info.size,
        State::Busy => stats.busy_bytes += info.size,
      }
    }

    stats
  }

  /// Copies the first `out.len()` blocks into `out` and returns how many
  /// were written.
  pub fn snapshot(
    &self,
    out: &mut [BlockInfo],
  ) -> usize {
    out.iter_mut().zip(self.blocks()).map(|(slot, info)| *slot = info).count()
  }

  /// A printable table of the chain.
  pub fn dump(&self) -> HeapDump<'_, A> {
    HeapDump { heap: self }
  }
}

/// Renders every block as a row, followed by the step count and the
/// high-water mark.
pub struct HeapDump<'a, A: Arena> {
  heap: &'a Heap<A>,
}

impl<A: Arena> fmt::Display for HeapDump<'_, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "{:>4}  {:>18}  {:>10}  {:>4}  {:>18}", "#", "payload", "size", "flag", "next")?;

    for (index, info) in self.heap.blocks().enumerate() {
      let flag = match info.state {
        State::Free => "free",
        State::Busy => "busy",
      };

      writeln!(
        f,
        "[{:>2}]  {:>18?}  {:>10}  {:>4}  {:>18?}",
        index,
        info.payload,
        info.size,
        flag,
        info.next.unwrap_or(ptr::null_mut()),
      )?;
    }

    writeln!(
      f,
      "blocks held = {}, header = {} bytes, high-water mark = {:?}",
      self.heap.block_count(),
      HEADER_SIZE,
      self.heap.high_water(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::BufferArena, config::HeapConfig};

  const STEP: usize = 1024;

  fn heap() -> Heap<BufferArena> {
    Heap::with_config(BufferArena::with_capacity(4 * STEP), HeapConfig::with_step(STEP)).unwrap()
  }

  #[test]
  fn test_blocks_link_payloads() {
    let mut heap = heap();

    let a = heap.allocate(16);
    let b = heap.allocate(32);

    let blocks: Vec<_> = heap.blocks().collect();

    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].payload, a);
    assert_eq!(blocks[0].next, Some(b));
    assert_eq!(blocks[1].payload, b);
    assert_eq!(blocks[1].size, 32);
    assert_eq!(blocks[2].next, None);
  }

  #[test]
  fn test_stats_add_up() {
    let mut heap = heap();

    heap.allocate(16);
    heap.allocate(32);

    let stats = heap.stats();

    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.block_count, 1);
    assert_eq!(stats.busy_bytes, 48);
    assert_eq!(stats.free_bytes, heap.free_bytes());
    assert_eq!(stats.busy_bytes + stats.free_bytes + stats.blocks * HEADER_SIZE, STEP);
  }

  #[test]
  fn test_snapshot_truncates() {
    let mut heap = heap();

    heap.allocate(16);
    heap.allocate(32);

    let empty = BlockInfo {
      payload: ptr::null_mut(),
      size: 0,
      state: State::Free,
      next: None,
    };
    let mut out = [empty; 2];

    assert_eq!(heap.snapshot(&mut out), 2);
    assert_eq!(out[1].size, 32);

    let mut wide = [empty; 8];
    assert_eq!(heap.snapshot(&mut wide), 3);
    assert_eq!(wide[3], empty);
  }

  #[test]
  fn test_dump_renders_rows() {
    let mut heap = heap();

    heap.allocate(16);

    let text = heap.dump().to_string();
    let lines: Vec<_> = text.lines().collect();

    assert_eq!(lines.len(), 4);
    assert!(lines[1].contains("busy"));
    assert!(lines[2].contains("free"));
    assert!(lines[3].starts_with("blocks held = 1"));
  }
}
