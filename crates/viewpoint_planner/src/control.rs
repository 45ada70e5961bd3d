//! Cooperative checkpoints for long-running operations.
//!
//! Every long operation calls [`Checkpoint::checkpoint`] at its safe points:
//! between raycast row sweeps, between graph growth iterations and between
//! optimizer passes. The planner worker uses this hook to block while paused
//! and to abort on cancel. Nothing is ever interrupted mid-mutation.

use thiserror::Error;

/// The running operation was cancelled at a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("operation interrupted")]
pub struct Interrupted;

pub trait Checkpoint {
  /// Returns `Err(Interrupted)` when the operation should stop. May block
  /// while the operation is paused.
  fn checkpoint(&self) -> Result<(), Interrupted>;
}

/// Checkpoint that never pauses or cancels. Used for synchronous calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unattended;

impl Checkpoint for Unattended {
  #[inline]
  fn checkpoint(&self) -> Result<(), Interrupted> {
    Ok(())
  }
}

impl<C: Checkpoint + ?Sized> Checkpoint for &C {
  #[inline]
  fn checkpoint(&self) -> Result<(), Interrupted> {
    (**self).checkpoint()
  }
}
