//! Mock share code store.

use super::lock;
use crate::providers::ShareCodeStore;
use async_trait::async_trait;
use campus_gsr_core::{BookingId, GsrError, Result, ShareCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock share code store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShareCodeStore {
    codes: Arc<Mutex<HashMap<String, ShareCode>>>,
}

impl InMemoryShareCodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored codes (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn code_count(&self) -> Result<usize> {
        Ok(lock(&self.codes)?.len())
    }
}

#[async_trait]
impl ShareCodeStore for InMemoryShareCodeStore {
    async fn insert(&self, code: &ShareCode) -> Result<()> {
        let mut codes = lock(&self.codes)?;
        if codes.contains_key(&code.code) {
            return Err(GsrError::Conflict("Share code already exists".to_string()));
        }
        if codes.values().any(|c| c.booking == code.booking) {
            return Err(GsrError::Conflict("Booking already shared".to_string()));
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn by_code(&self, code: &str) -> Result<Option<ShareCode>> {
        Ok(lock(&self.codes)?.get(code).cloned())
    }

    async fn by_booking(&self, booking: BookingId) -> Result<Option<ShareCode>> {
        Ok(lock(&self.codes)?.values().find(|c| c.booking == booking).cloned())
    }

    async fn delete(&self, code: &str) -> Result<bool> {
        Ok(lock(&self.codes)?.remove(code).is_some())
    }
}
