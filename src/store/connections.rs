use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::observability::metrics::Metrics;

#[derive(Debug)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

#[derive(Debug)]
pub struct ConnectionReceiver {
    connection_id: Uuid,
    receiver: mpsc::Receiver<ServerEvent>,
}

impl ConnectionHandle {
    pub fn channel(buffer: usize) -> (ConnectionHandle, ConnectionReceiver) {
        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            ConnectionHandle {
                connection_id,
                sender,
            },
            ConnectionReceiver {
                connection_id,
                receiver,
            },
        )
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl ConnectionReceiver {
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }
}

pub struct ConnectionRegistry {
    connections: DashMap<Identity, ConnectionHandle>,
    send_timeout: Duration,
    metrics: Metrics,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration, metrics: Metrics) -> Self {
        Self {
            connections: DashMap::new(),
            send_timeout,
            metrics,
        }
    }

    pub fn register(&self, identity: Identity, handle: ConnectionHandle) {
        let connection_id = handle.connection_id;
        match self.connections.insert(identity, handle) {
            Some(previous) => {
                info!(
                    identity = %identity,
                    previous = %previous.connection_id,
                    connection_id = %connection_id,
                    "replacing live connection"
                );
                drop(previous);
            }
            None => {
                self.metrics.live_connections.inc();
                info!(identity = %identity, connection_id = %connection_id, "live connection registered");
            }
        }
    }

    pub fn unregister(&self, identity: &Identity) {
        if self.connections.remove(identity).is_some() {
            self.metrics.live_connections.dec();
            info!(identity = %identity, "live connection unregistered");
        }
    }

    /// Removes the binding only if it still belongs to `connection_id`.
    pub fn unregister_connection(&self, identity: &Identity, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(identity, |_, handle| handle.connection_id == connection_id)
            .is_some();

        if removed {
            self.metrics.live_connections.dec();
            info!(identity = %identity, connection_id = %connection_id, "live connection unregistered");
        }
        removed
    }

    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.connections
            .get(identity)
            .is_some_and(|handle| !handle.is_closed())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub async fn send_to(&self, identity: &Identity, event: ServerEvent) -> Result<(), AppError> {
        let (connection_id, sender) = match self.connections.get(identity) {
            Some(handle) => (handle.connection_id, handle.sender.clone()),
            None => return Err(self.not_connected(identity, "no live connection")),
        };

        match timeout(self.send_timeout, sender.send(event)).await {
            Ok(Ok(())) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["delivered"])
                    .inc();
                Ok(())
            }
            Ok(Err(_closed)) => {
                self.unregister_connection(identity, connection_id);
                Err(self.not_connected(identity, "connection closed"))
            }
            Err(_elapsed) => Err(self.not_connected(identity, "send timed out")),
        }
    }

    fn not_connected(&self, identity: &Identity, reason: &str) -> AppError {
        debug!(identity = %identity, reason, "identity not reachable");
        self.metrics
            .notifications_total
            .with_label_values(&["not_connected"])
            .inc();
        AppError::IdentityNotConnected(identity.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::{ConnectionHandle, ConnectionRegistry};
    use crate::error::AppError;
    use crate::models::event::ServerEvent;
    use crate::models::identity::Identity;
    use crate::observability::metrics::Metrics;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_millis(100), Metrics::new())
    }

    fn ride_event(seed: u128) -> ServerEvent {
        ServerEvent::RideCompleted {
            ride_id: Uuid::from_u128(seed),
        }
    }

    #[tokio::test]
    async fn send_without_connection_is_identity_not_connected() {
        let registry = registry();
        let cap_42 = Identity::captain(Uuid::from_u128(42));

        let err = registry.send_to(&cap_42, ServerEvent::Pong).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityNotConnected(_)));
    }

    #[tokio::test]
    async fn reconnect_closes_previous_handle() {
        let registry = registry();
        let id = Identity::captain(Uuid::from_u128(1));

        let (h1, mut rx1) = ConnectionHandle::channel(8);
        let (h2, mut rx2) = ConnectionHandle::channel(8);
        registry.register(id, h1);
        registry.register(id, h2);

        assert!(rx1.recv().await.is_none());

        registry.send_to(&id, ServerEvent::Pong).await.unwrap();
        assert_eq!(rx2.recv().await, Some(ServerEvent::Pong));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn delivery_is_fifo_per_identity() {
        let registry = registry();
        let id = Identity::user(Uuid::from_u128(5));
        let (handle, mut rx) = ConnectionHandle::channel(16);
        registry.register(id, handle);

        for seed in 0..10 {
            registry.send_to(&id, ride_event(seed)).await.unwrap();
        }
        for seed in 0..10 {
            assert_eq!(rx.recv().await, Some(ride_event(seed)));
        }
    }

    #[tokio::test]
    async fn dead_handle_is_pruned_and_reported() {
        let registry = registry();
        let id = Identity::user(Uuid::from_u128(6));
        let (handle, rx) = ConnectionHandle::channel(4);
        registry.register(id, handle);
        drop(rx);

        assert!(!registry.is_connected(&id));
        let err = registry.send_to(&id, ServerEvent::Pong).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityNotConnected(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn full_queue_times_out_as_not_connected() {
        let registry = registry();
        let id = Identity::captain(Uuid::from_u128(8));
        let (handle, _rx) = ConnectionHandle::channel(1);
        registry.register(id, handle);

        registry.send_to(&id, ServerEvent::Pong).await.unwrap();
        let err = registry.send_to(&id, ServerEvent::Pong).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityNotConnected(_)));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = registry();
        let id = Identity::captain(Uuid::from_u128(3));
        registry.unregister(&id);

        let (handle, _rx) = ConnectionHandle::channel(1);
        registry.register(id, handle);
        registry.unregister(&id);
        registry.unregister(&id);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_connection_cannot_evict_its_replacement() {
        let registry = registry();
        let id = Identity::captain(Uuid::from_u128(4));
        let (old, _old_rx) = ConnectionHandle::channel(1);
        let old_id = old.connection_id();
        let (new, _new_rx) = ConnectionHandle::channel(1);

        registry.register(id, old);
        registry.register(id, new);

        assert!(!registry.unregister_connection(&id, old_id));
        assert!(registry.is_connected(&id));
    }
}
