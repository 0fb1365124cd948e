use crate::{align::ALIGNMENT, block::HEADER_SIZE, error::ConfigError};

/// Size of an OS page.
pub const PAGE_SIZE: usize = 4096;

/// Pages requested from the arena per growth step.
pub const STEP_PAGES: usize = 33;

/// Tunables of a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes the arena grows or shrinks by at a time. Also the largest free
  /// tail the heap keeps before handing memory back.
  pub step: usize,
}

impl HeapConfig {
  pub const DEFAULT: Self = Self {
    step: STEP_PAGES * PAGE_SIZE,
  };

  /// The largest step accepted; anything larger could not be passed to
  /// `sbrk` or added to a block size without wrapping.
  pub const MAX_STEP: usize = isize::MAX as usize / 4;

  pub const fn with_pages(
    pages: usize,
  ) -> Self {
    Self {
      step: pages.saturating_mul(PAGE_SIZE),
    }
  }

  pub const fn with_step(
    step: usize,
  ) -> Self {
    Self { step }
  }

  pub fn validate(self) -> Result<Self, ConfigError> {
    if self.step % ALIGNMENT != 0 {
      return Err(ConfigError::Unaligned {
        step: self.step,
        align: ALIGNMENT,
      });
    }

    if self.step <= HEADER_SIZE {
      return Err(ConfigError::TooSmall {
        step: self.step,
        header: HEADER_SIZE,
      });
    }

    if self.step > Self::MAX_STEP {
      return Err(ConfigError::TooLarge {
        step: self.step,
        max: Self::MAX_STEP,
      });
    }

    Ok(self)
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_step_is_33_pages() {
    assert_eq!(HeapConfig::default().step, 135_168);
    assert_eq!(HeapConfig::with_pages(33), HeapConfig::DEFAULT);
    assert!(HeapConfig::DEFAULT.validate().is_ok());
  }

  #[test]
  fn test_validate_rejects_bad_steps() {
    assert_eq!(
      HeapConfig::with_step(1001).validate(),
      Err(ConfigError::Unaligned { step: 1001, align: ALIGNMENT })
    );
    assert_eq!(
      HeapConfig::with_step(HEADER_SIZE).validate(),
      Err(ConfigError::TooSmall {
        step: HEADER_SIZE,
        header: HEADER_SIZE
      })
    );
    assert!(matches!(
      HeapConfig::with_pages(isize::MAX as usize / PAGE_SIZE).validate(),
      Err(ConfigError::TooLarge { .. })
    ));
  }

  #[test]
  fn test_max_step_is_the_upper_bound() {
    let largest = HeapConfig::MAX_STEP & !(ALIGNMENT - 1);

    assert!(HeapConfig::with_step(largest).validate().is_ok());
    assert_eq!(
      HeapConfig::with_step(largest + ALIGNMENT).validate(),
      Err(ConfigError::TooLarge {
        step: largest + ALIGNMENT,
        max: HeapConfig::MAX_STEP
      })
    );
  }
}
