//! Scriptable in-memory dispatch client for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cartage_core::{NetworkAddress, OrderId};

use super::{DispatchClient, OrderProgress};
use crate::error::{Error, Result};

/// A submitted order, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedOrder {
    /// The generated order id.
    pub order_id: OrderId,
    /// Resolved origin address.
    pub origin: NetworkAddress,
    /// Resolved destination address.
    pub destination: NetworkAddress,
}

/// In-memory dispatch client.
///
/// Orders get deterministic sequential ids. Tests script progress with
/// [`set_progress`](Self::set_progress) and force transport failures with
/// [`fail_next_submit`](Self::fail_next_submit); unscripted orders report
/// [`OrderProgress::EnRoute`].
#[derive(Debug, Default)]
pub struct InMemoryDispatchClient {
    sequence: AtomicU64,
    fail_submit: AtomicBool,
    fail_poll: AtomicBool,
    progress: Mutex<HashMap<OrderId, OrderProgress>>,
    submitted: Mutex<Vec<SubmittedOrder>>,
}

impl InMemoryDispatchClient {
    /// Creates a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `submit_order` call fail with `DispatchUnavailable`.
    pub fn fail_next_submit(&self) {
        self.fail_submit.store(true, Ordering::SeqCst);
    }

    /// Makes the next `poll_order` call fail with `DispatchUnavailable`.
    pub fn fail_next_poll(&self) {
        self.fail_poll.store(true, Ordering::SeqCst);
    }

    /// Scripts the progress reported for an order.
    pub fn set_progress(&self, order: OrderId, progress: OrderProgress) {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(order, progress);
    }

    /// Returns every order submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<SubmittedOrder> {
        self.submitted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Returns the most recently submitted order.
    #[must_use]
    pub fn last_submitted(&self) -> Option<SubmittedOrder> {
        self.submitted().pop()
    }
}

#[async_trait]
impl DispatchClient for InMemoryDispatchClient {
    async fn submit_order(
        &self,
        origin: &NetworkAddress,
        destination: &NetworkAddress,
    ) -> Result<OrderId> {
        if self.fail_submit.swap(false, Ordering::SeqCst) {
            return Err(Error::dispatch_unavailable("scripted submit failure"));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = OrderId::parse(format!("{seq:013}"))?;
        self.submitted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SubmittedOrder {
                order_id: order_id.clone(),
                origin: origin.clone(),
                destination: destination.clone(),
            });
        Ok(order_id)
    }

    async fn poll_order(&self, order: &OrderId) -> Result<OrderProgress> {
        if self.fail_poll.swap(false, Ordering::SeqCst) {
            return Err(Error::dispatch_unavailable("scripted poll failure"));
        }
        let progress = self
            .progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(order)
            .copied()
            .unwrap_or(OrderProgress::EnRoute);
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_records_and_numbers_orders() -> Result<()> {
        let client = InMemoryDispatchClient::new();
        let a = NetworkAddress::new("amr-01");
        let b = NetworkAddress::new("amr-02");

        let first = client.submit_order(&a, &b).await?;
        let second = client.submit_order(&b, &a).await?;
        assert_ne!(first, second);
        assert_eq!(client.submitted().len(), 2);
        assert_eq!(client.last_submitted().map(|o| o.order_id), Some(second));
        Ok(())
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() -> Result<()> {
        let client = InMemoryDispatchClient::new();
        let a = NetworkAddress::new("amr-01");
        let b = NetworkAddress::new("amr-02");

        client.fail_next_submit();
        assert!(client.submit_order(&a, &b).await.is_err());
        assert!(client.submit_order(&a, &b).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn poll_defaults_to_en_route() -> Result<()> {
        let client = InMemoryDispatchClient::new();
        let a = NetworkAddress::new("amr-01");
        let b = NetworkAddress::new("amr-02");
        let order = client.submit_order(&a, &b).await?;

        assert_eq!(client.poll_order(&order).await?, OrderProgress::EnRoute);
        client.set_progress(order.clone(), OrderProgress::Complete);
        assert_eq!(client.poll_order(&order).await?, OrderProgress::Complete);
        Ok(())
    }
}
