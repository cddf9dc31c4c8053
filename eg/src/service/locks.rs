//! Per-exercise run locks

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// One permit per exercise slug
///
/// Turns for the same exercise queue behind each other; turns for different
/// exercises never contend.
#[derive(Default)]
pub struct ExerciseLocks {
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ExerciseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the exercise's permit; released on drop
    pub async fn acquire(&self, slug: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        let semaphore = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(slug.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        if semaphore.available_permits() == 0 {
            debug!(%slug, "ExerciseLocks::acquire: waiting for running turn");
        }
        semaphore.acquire_owned().await
    }

    /// Whether a turn currently holds the exercise's permit
    pub async fn is_busy(&self, slug: &str) -> bool {
        self.slots
            .lock()
            .await
            .get(slug)
            .is_some_and(|s| s.available_permits() == 0)
    }
}
