//! Bounded webhook concurrency.
//!
//! Webhook handlers do real database work, and providers are happy to deliver in bursts. A
//! small FIFO semaphore in front of the settlement flow keeps the burst from fanning out into
//! the database; waiting deliveries are served in arrival order (`tokio::sync::Semaphore` is
//! fair).

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::ServerError;

#[derive(Clone)]
pub struct WebhookLimiter {
    permits: Arc<Semaphore>,
}

impl WebhookLimiter {
    pub fn new(max_in_flight: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(max_in_flight)) }
    }

    /// Waits for a processing slot. The permit is held for the duration of the webhook's
    /// business logic and released on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServerError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ServerError::BackendError(format!("Webhook limiter closed: {e}")))
    }
}
