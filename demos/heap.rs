use std::{io::BufRead, ptr::NonNull};

use brkheap::{Heap, SbrkArena};
use libc::sbrk;

/// Holds the walk-through at `step` until a line arrives on stdin, leaving
/// time to look at the process from outside (`pmap`, `/proc/<pid>/maps`).
fn pause(
  step: &str,
) {
  println!("\n({}) press ENTER for the next step", step);
  let _ = std::io::stdin().lock().lines().next();
}

/// Prints the program break next to the heap's own high-water mark. They
/// only differ when something else has moved the break.
fn print_marks(
  label: &str,
  heap: &Heap<SbrkArena>,
) {
  let brk = unsafe { sbrk(0) };

  println!(
    "[{}] pid {} | break {:?} | high-water {:?} | steps held {}",
    label,
    std::process::id(),
    brk,
    heap.high_water(),
    heap.block_count(),
  );
}

fn print_heap(
  heap: &Heap<SbrkArena>,
) {
  println!("{}", heap.dump());
}

fn main() {
  env_logger::init();

  // The standard library keeps using the system allocator here; this heap
  // shares the program break with it and refuses to move the break once the
  // system allocator has moved it too.
  let mut heap = Heap::new(SbrkArena::new());

  print_marks("start", &heap);
  pause("start");

  unsafe {
    // 1) The first request sets the heap up with one 33-page step.
    let first = heap.allocate(4);
    first.cast::<u32>().write(0xDEADBEEF);
    println!(
      "\n[1] 4 bytes at {:?} (usable {}), holding 0x{:X}",
      first,
      NonNull::new(first).map_or(0, |ptr| heap.usable_size(ptr)),
      first.cast::<u32>().read()
    );
    print_marks("1", &heap);
    print_heap(&heap);
    pause("1");

    // 2) Later requests are carved out of the same step.
    let second = heap.allocate(12);
    second.write_bytes(0xAB, 12);
    let third = heap.allocate(64);
    let fourth = heap.zero_allocate(16, 2);
    println!("\n[2] Carved 12, 64 and a zeroed 16 x 2 bytes");
    print_heap(&heap);
    pause("2");

    // 3) Neighbouring holes merge.
    heap.deallocate(second);
    heap.deallocate(third);
    println!("\n[3] Released the second and third blocks");
    print_heap(&heap);
    pause("3");

    // 4) The first block grows into the hole right behind it.
    let grown = heap.reallocate(first, 48);
    println!(
      "\n[4] First block resized to 48 bytes {}",
      if grown == first { "in place" } else { "by moving it" }
    );
    print_heap(&heap);
    pause("4");

    // 5) A second release of the same block only logs a warning
    //    (RUST_LOG=warn to see it).
    heap.deallocate(fourth);
    heap.deallocate(fourth);
    println!("\n[5] Released the fourth block twice");
    pause("5");

    // 6) A request larger than the free tail grows the arena step by step.
    let big = heap.allocate(512 * 1024);
    println!(
      "\n[6] 512 KiB request {}",
      if big.is_null() { "failed" } else { "served" }
    );
    print_marks("6", &heap);
    print_heap(&heap);
    pause("6");

    // 7) Releasing it hands whole steps back, unless the break has moved.
    heap.deallocate(big);
    println!("\n[7] Released the large block");
    print_marks("7", &heap);
    print_heap(&heap);
  }

  println!("\nDone; the OS reclaims the rest at exit.");
}
