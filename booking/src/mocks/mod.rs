//! In-memory implementations of the storage traits and a scripted upstream.
//!
//! Enabled by the `test-utils` feature (on by default).

mod directory;
mod reservations;
mod share_codes;
mod upstream;

pub use directory::InMemoryDirectory;
pub use reservations::InMemoryReservationStore;
pub use share_codes::InMemoryShareCodeStore;
pub use upstream::{MockUpstream, UpstreamCall};

use campus_gsr_core::{GsrError, Result};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| GsrError::Storage("Mutex lock failed".to_string()))
}
