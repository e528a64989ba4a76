//! Cooperative deadlines for multi-step operations.

use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// Checked between steps; a step already running is never interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
  at: Option<Instant>,
}

impl Deadline {
  pub fn none() -> Self { Self { at: None } }

  pub fn at(at: Instant) -> Self { Self { at: Some(at) } }

  pub fn after(timeout: Duration) -> Self { Self::at(Instant::now() + timeout) }

  pub fn is_expired(&self) -> bool { self.at.is_some_and(|at| Instant::now() >= at) }

  pub fn check(&self, operation: &'static str) -> Result<()> {
    if self.is_expired() {
      return Err(Error::Timeout { operation });
    }
    Ok(())
  }
}
