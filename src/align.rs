/// Granularity of every block size and every header address.
pub const ALIGNMENT: usize = 8;

/// Rounds the given size up to the heap's 8-byte granularity.
///
/// The expression must not overflow; use [`checked_align`] for untrusted sizes.
///
/// # Examples
///
/// ```rust
/// use brkheap::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(0), 0);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Rounds `value` up to the 8-byte granularity, or `None` if that wraps.
pub const fn checked_align(
  value: usize,
) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(ALIGNMENT - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_checked_align_rejects_wrap_around() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - ALIGNMENT + 2), None);
    assert_eq!(checked_align(usize::MAX - ALIGNMENT + 1), Some(usize::MAX - ALIGNMENT + 1));
  }
}
