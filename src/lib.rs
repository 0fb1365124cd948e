//! # brkheap - A First-Fit Free-List Heap on the Program Break
//!
//! This crate provides a heap allocator that manages memory taken directly
//! from the operating system with `sbrk(2)`. Freed blocks are reused, split
//! and merged, and memory at the top of the heap is handed back to the OS.
//!
//! ## Overview
//!
//! The heap is one contiguous arena cut into blocks. Every block starts with
//! a header, and the headers form a chain in address order:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          ARENA                                       │
//!   │                                                                      │
//!   │   ┌───┬──────┬───┬────────┬───┬────┬───┬──────────────────────────┐  │
//!   │   │ H │ busy │ H │  free  │ H │busy│ H │          free            │  │
//!   │   └─┬─┴──────┴─▲─┴────────┴─▲─┴────┴─▲─┴──────────────────────────┘  │
//!   │     │          │ │          │ │      │ │                          ▲   │
//!   │     └──────────┘ └──────────┘ └──────┘ └─ next = none             │   │
//!   │                                                          High-water  │
//!   │                                                             mark     │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   H = header { next, size, state }
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkheap
//!   ├── align      - 8-byte rounding (align!, checked_align)
//!   ├── arena      - Arena trait, SbrkArena, BufferArena
//!   ├── block      - Inline block headers (internal)
//!   ├── config     - HeapConfig (growth step)
//!   ├── dump       - Chain introspection
//!   ├── error      - ArenaError, AllocError, ConfigError
//!   ├── global     - Locked process-wide heap, GlobalAlloc
//!   ├── heap       - Heap: allocate, zero_allocate, reallocate, deallocate
//!   ├── locate     - First-fit search and arena growth (internal)
//!   └── split      - Carving, merging and arena shrink (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkheap::{BufferArena, Heap, HeapConfig};
//!
//! let arena = BufferArena::with_capacity(64 * 1024);
//! let mut heap = Heap::with_config(arena, HeapConfig::with_pages(2)).unwrap();
//!
//! let ptr = heap.allocate(13);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write_bytes(0xAB, 13);
//!     heap.deallocate(ptr);
//! }
//!
//! // The freed block is handed out again.
//! assert_eq!(heap.allocate(13), ptr);
//! ```
//!
//! ## How It Works
//!
//! Allocation walks the chain from the first header and takes the first free
//! block that is large enough. When none is, the arena grows one step
//! (33 pages by default) at a time. The chosen block is split when the
//! leftover can hold another header:
//!
//! ```text
//!   Carving 64 bytes out of a free block:
//!
//!   before  ┌───┬──────────────────────────────────────┐
//!           │ H │              free: N                 │
//!           └───┴──────────────────────────────────────┘
//!
//!   after   ┌───┬──────────┬───┬───────────────────────┐
//!           │ H │ busy: 64 │ H │  free: N - 64 - |H|   │
//!           └───┴──────────┴───┴───────────────────────┘
//!                ▲
//!                └── Pointer returned to user
//! ```
//!
//! Releasing a block merges it with free neighbours. When the last block is
//! free and larger than one step, whole steps are given back to the OS until
//! it is not.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`Heap`] takes `&mut self`; [`GlobalHeap`]
//!   adds one spin lock around it
//! - **8-byte alignment only**: larger alignments are refused
//! - **No in-place shrink**: reallocating to a smaller size keeps the block
//! - **Unix-only**: [`SbrkArena`] requires `libc` and `sbrk`
//!
//! ## Safety
//!
//! Pointers passed back to the heap must be ones it handed out. The header
//! is found by stepping back from the pointer; anything else is undefined
//! behaviour.

pub mod align;
pub mod arena;
mod block;
pub mod config;
pub mod dump;
pub mod error;
pub mod global;
mod heap;
mod locate;
mod split;

pub use arena::{Arena, BufferArena, SbrkArena};
pub use block::{HEADER_SIZE, State};
pub use config::HeapConfig;
pub use dump::{BlockInfo, HeapDump, HeapStats};
pub use error::{AllocError, ArenaError, ConfigError};
pub use global::{GlobalHeap, ProcessHeap};
pub use heap::Heap;
