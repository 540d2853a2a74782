//! Thin wrapper over the relay pool.
//!
//! The orchestrator only needs two operations: a bounded query that drains
//! stored results, and a best-effort publish fan-out. Both are behind a trait
//! so tests can substitute an in-memory transport.

use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no relays configured")]
    NoRelays,

    #[error("relay query failed: {0}")]
    Query(String),

    #[error("no relay accepted the event: {0}")]
    Publish(String),
}

/// Per-endpoint outcome of a publish fan-out. Partial acceptance is success.
#[derive(Debug, Clone, Copy)]
pub struct PublishReport {
    pub accepted: usize,
    pub rejected: usize,
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Fetch stored events matching `filter`, returning once every connected
    /// relay has signalled end-of-stored-events or the timeout elapses.
    /// Relays may disagree; callers pick a winner by `created_at`.
    async fn query(&self, filter: Filter, timeout: Duration)
        -> Result<Vec<Event>, TransportError>;

    /// Broadcast a signed event to every connected relay. Fails only when no
    /// relay accepts it.
    async fn publish(&self, event: Event) -> Result<PublishReport, TransportError>;
}

/// Production transport backed by the nostr-sdk relay pool.
pub struct RelayPool {
    client: Client,
}

impl RelayPool {
    pub async fn connect(relays: &[String]) -> Result<Self, TransportError> {
        if relays.is_empty() {
            return Err(TransportError::NoRelays);
        }

        let client = Client::default();
        for url in relays {
            if let Err(e) = client.add_relay(url.clone()).await {
                tracing::warn!("Skipping invalid relay {}: {}", url, e);
            }
        }
        client.connect().await;

        Ok(Self { client })
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[async_trait]
impl RelayTransport for RelayPool {
    async fn query(
        &self,
        filter: Filter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        let events = self
            .client
            .fetch_events(filter, timeout)
            .await
            .map_err(|e| TransportError::Query(e.to_string()))?;
        Ok(events.into_iter().collect())
    }

    async fn publish(&self, event: Event) -> Result<PublishReport, TransportError> {
        let output = self
            .client
            .send_event(event)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        for (url, reason) in output.failed.iter() {
            tracing::warn!("Relay {} rejected event: {:?}", url, reason);
        }

        Ok(PublishReport {
            accepted: output.success.len(),
            rejected: output.failed.len(),
        })
    }
}
