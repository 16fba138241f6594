//! Helpers shared by the unit tests.
//!
//! The scheduler reaps children with `waitpid(-1)` and installs process-wide signal handlers, so
//! tests that spawn processes or raise signals must not overlap.

use std::sync::{Mutex, MutexGuard, PoisonError};

static EXCLUSIVE: Mutex<()> = Mutex::new(());

pub(crate) fn exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner)
}
