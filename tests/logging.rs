//! A logger that allocates through the very heap it is recording.

use std::{
  ptr::NonNull,
  sync::{
    OnceLock,
    atomic::{AtomicUsize, Ordering},
    mpsc,
  },
  thread,
  time::Duration,
};

use brkheap::{Arena, ArenaError, BufferArena, GlobalHeap, Heap, HeapConfig};
use log::{LevelFilter, Log, Metadata, Record};

const STEP: usize = 1024;

/// Grows like a buffer but never takes memory back, the way the program
/// break behaves once another allocator has moved it.
struct StickyArena(BufferArena);

unsafe impl Arena for StickyArena {
  unsafe fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ArenaError> {
    unsafe { self.0.grow(increment) }
  }

  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), ArenaError> {
    Err(ArenaError::Underflow { requested: decrement })
  }
}

static HEAP: OnceLock<GlobalHeap<StickyArena>> = OnceLock::new();
static RECORDS: AtomicUsize = AtomicUsize::new(0);

fn heap() -> &'static GlobalHeap<StickyArena> {
  HEAP.get_or_init(|| {
    let arena = StickyArena(BufferArena::with_capacity(64 * STEP));
    GlobalHeap::from_heap(Heap::with_config(arena, HeapConfig::with_step(STEP)).unwrap())
  })
}

/// Takes a few bytes from the shared heap for every record it sees.
struct AllocatingLogger;

impl Log for AllocatingLogger {
  fn enabled(
    &self,
    _metadata: &Metadata,
  ) -> bool {
    true
  }

  fn log(
    &self,
    _record: &Record,
  ) {
    assert!(!heap().allocate(64).is_null());
    RECORDS.fetch_add(1, Ordering::SeqCst);
  }

  fn flush(&self) {}
}

static LOGGER: AllocatingLogger = AllocatingLogger;

#[test]
fn test_refused_shrink_is_logged_outside_the_lock() {
  log::set_logger(&LOGGER).unwrap();
  log::set_max_level(LevelFilter::Warn);

  let (done, finished) = mpsc::channel();

  thread::spawn(move || {
    let big = heap().allocate(4 * STEP);
    assert!(!big.is_null());

    unsafe { heap().deallocate(big) };
    done.send(()).unwrap();
  });

  finished
    .recv_timeout(Duration::from_secs(10))
    .expect("deallocation did not finish");

  // Every warning took its 64 bytes from the heap after the lock was free.
  let records = RECORDS.load(Ordering::SeqCst);
  assert!(records >= 1);
  assert_eq!(heap().stats().busy_bytes, 64 * records);
}
