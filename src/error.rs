use thiserror::Error;

/// Failures reported by an [`Arena`](crate::arena::Arena) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
  #[error("arena cannot grow by {requested} bytes")]
  Exhausted { requested: usize },

  #[error("arena cannot retract {requested} bytes")]
  Underflow { requested: usize },

  /// The region handed out (or the current break) is not where the heap's
  /// high-water mark says it should be.
  #[error("arena boundary moved: expected {expected:#x}, found {found:#x}")]
  Discontiguous { expected: usize, found: usize },

  #[error("arena region at {addr:#x} is not {align}-byte aligned")]
  Misaligned { addr: usize, align: usize },
}

/// Failures of the allocation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error(transparent)]
  Arena(#[from] ArenaError),

  #[error("request of {size} bytes cannot be represented")]
  SizeOverflow { size: usize },

  #[error("element count and element size must both be non-zero")]
  ZeroSized,

  #[error("previously freed memory block at {addr:#x}")]
  DoubleFree { addr: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("growth step of {step} bytes is not a multiple of {align}")]
  Unaligned { step: usize, align: usize },

  #[error("growth step of {step} bytes cannot hold a {header}-byte header and a payload")]
  TooSmall { step: usize, header: usize },

  #[error("growth step of {step} bytes exceeds the largest supported step of {max}")]
  TooLarge { step: usize, max: usize },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_error_converts_into_alloc_error() {
    let err: AllocError = ArenaError::Exhausted { requested: 4096 }.into();

    assert_eq!(err, AllocError::Arena(ArenaError::Exhausted { requested: 4096 }));
    assert_eq!(err.to_string(), "arena cannot grow by 4096 bytes");
  }

  #[test]
  fn test_double_free_message() {
    let err = AllocError::DoubleFree { addr: 0x1000 };

    assert_eq!(err.to_string(), "previously freed memory block at 0x1000");
  }
}
