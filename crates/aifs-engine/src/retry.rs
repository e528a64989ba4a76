//! Bounded retry with exponential backoff for transient filesystem errors.
//!
//! Runs on blocking threads only; the sleep is a plain thread sleep.

use std::{io, thread, time::Duration};

const ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 10;
const BACKOFF_MAX_MS: u64 = 200;

fn backoff_millis(attempt: u32) -> u64 {
  if attempt == 0 {
    return BACKOFF_BASE_MS;
  }
  let shift = attempt.saturating_sub(1).min(10);
  BACKOFF_BASE_MS.saturating_mul(1 << shift).min(BACKOFF_MAX_MS)
}

/// Errors worth another attempt. Everything else, integrity failures
/// included, surfaces immediately.
pub(crate) fn is_transient(err: &io::Error) -> bool {
  matches!(
    err.kind(),
    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
  )
}

/// Run `f` up to [`ATTEMPTS`] times while it fails transiently.
pub(crate) fn with_retry<T>(
  op: &'static str,
  mut f: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
  let mut attempt = 1;
  loop {
    match f() {
      Err(e) if is_transient(&e) && attempt < ATTEMPTS => {
        let delay = backoff_millis(attempt);
        tracing::debug!(op, attempt, delay_ms = delay, error = %e, "transient io error, retrying");
        thread::sleep(Duration::from_millis(delay));
        attempt += 1;
      }
      other => return other,
    }
  }
}
