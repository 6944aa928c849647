use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::captain::GeoPoint;
use crate::models::event::{ClientMessage, ServerEvent};
use crate::models::identity::Identity;
use crate::observability::metrics::Metrics;
use crate::store::captains::CaptainDirectory;
use crate::store::connections::{ConnectionHandle, ConnectionRegistry};
use crate::store::interest::InterestRegistry;
use crate::store::locations::{LocationFix, LocationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Streaming,
    Disconnected,
}

struct OfflineTimer {
    id: Uuid,
    task: JoinHandle<()>,
}

pub struct LiveUpdateDispatcher {
    locations: Arc<LocationStore>,
    captains: Arc<CaptainDirectory>,
    registry: Arc<ConnectionRegistry>,
    interest: Arc<InterestRegistry>,
    pending_offline: Arc<DashMap<Uuid, OfflineTimer>>,
    offline_grace: Duration,
    metrics: Metrics,
}

impl LiveUpdateDispatcher {
    pub fn new(
        locations: Arc<LocationStore>,
        captains: Arc<CaptainDirectory>,
        registry: Arc<ConnectionRegistry>,
        interest: Arc<InterestRegistry>,
        offline_grace: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            locations,
            captains,
            registry,
            interest,
            pending_offline: Arc::new(DashMap::new()),
            offline_grace,
            metrics,
        }
    }

    pub fn open_session(self: &Arc<Self>, identity: Identity, handle: ConnectionHandle) -> Session {
        let connection_id = handle.connection_id();

        // Register first so a timer that already woke sees the new connection.
        self.registry.register(identity, handle);

        if let Some(captain_id) = identity.captain_id() {
            if let Some((_, timer)) = self.pending_offline.remove(&captain_id) {
                timer.task.abort();
                debug!(captain_id = %captain_id, "captain reconnected within grace period");
            }
        }

        Session {
            identity,
            connection_id,
            state: SessionState::Connected,
            dispatcher: Arc::clone(self),
        }
    }

    pub async fn push_location(
        &self,
        captain_id: Uuid,
        point: GeoPoint,
    ) -> Result<LocationFix, AppError> {
        let result = self.write_location(captain_id, point);
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(AppError::InvalidCoordinate(_)) => "invalid",
            Err(_) => "rejected",
        };
        self.metrics
            .location_updates_total
            .with_label_values(&[outcome])
            .inc();
        let fix = result?;

        let event = ServerEvent::LocationChanged {
            captain_id,
            location: fix.point,
            recorded_at: fix.recorded_at,
        };
        let watchers = self.interest.watchers(&captain_id);
        let sends = watchers
            .iter()
            .map(|watcher| self.registry.send_to(watcher, event.clone()));
        for (watcher, result) in watchers.iter().zip(join_all(sends).await) {
            if let Err(err) = result {
                debug!(captain_id = %captain_id, watcher = %watcher, error = %err, "location not forwarded");
            }
        }

        Ok(fix)
    }

    fn write_location(&self, captain_id: Uuid, point: GeoPoint) -> Result<LocationFix, AppError> {
        self.captains.get(&captain_id)?;
        let fix = self.locations.set_location(captain_id, point)?;

        // A delete that landed between the check and the write must not leave a fix behind.
        if let Err(err) = self.captains.get(&captain_id) {
            self.locations.remove(&captain_id);
            return Err(err);
        }
        Ok(fix)
    }

    pub async fn notify(&self, identity: &Identity, event: ServerEvent) -> Result<(), AppError> {
        self.registry.send_to(identity, event).await
    }

    pub async fn notify_all(&self, identities: &[Identity], event: &ServerEvent) -> usize {
        let sends = identities
            .iter()
            .map(|identity| self.registry.send_to(identity, event.clone()));
        join_all(sends)
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count()
    }

    fn disconnect(&self, identity: Identity, connection_id: Uuid) {
        if !self.registry.unregister_connection(&identity, connection_id) {
            return;
        }

        let Some(captain_id) = identity.captain_id() else {
            return;
        };

        let captains = Arc::clone(&self.captains);
        let registry = Arc::clone(&self.registry);
        let pending = Arc::clone(&self.pending_offline);
        let grace = self.offline_grace;
        let timer_id = Uuid::new_v4();

        let task = tokio::spawn(async move {
            sleep(grace).await;
            pending.remove_if(&captain_id, |_, timer| timer.id == timer_id);
            if registry.is_connected(&identity) {
                return;
            }
            if captains.mark_offline_if_available(&captain_id) {
                info!(captain_id = %captain_id, "captain marked offline after grace period");
            }
        });

        let timer = OfflineTimer { id: timer_id, task };
        if let Some(previous) = self.pending_offline.insert(captain_id, timer) {
            previous.task.abort();
        }
    }
}

pub struct Session {
    identity: Identity,
    connection_id: Uuid,
    state: SessionState,
    dispatcher: Arc<LiveUpdateDispatcher>,
}

impl Session {
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn handle(&mut self, message: ClientMessage) -> Result<ServerEvent, AppError> {
        match message {
            ClientMessage::UpdateLocation { location } => {
                let captain_id = self.identity.captain_id().ok_or_else(|| {
                    AppError::InvalidArguments("only captains can stream locations".to_string())
                })?;

                let fix = self.dispatcher.push_location(captain_id, location).await?;
                if self.state == SessionState::Connected {
                    debug!(captain_id = %captain_id, "session streaming");
                    self.state = SessionState::Streaming;
                }
                Ok(ServerEvent::LocationAccepted {
                    recorded_at: fix.recorded_at,
                })
            }
            ClientMessage::Ping => Ok(ServerEvent::Pong),
            ClientMessage::Join { .. } => Err(AppError::Conflict(
                "session already joined".to_string(),
            )),
        }
    }

    pub fn close(mut self) {
        self.state = SessionState::Disconnected;
        self.dispatcher.disconnect(self.identity, self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::{LiveUpdateDispatcher, SessionState};
    use crate::error::AppError;
    use crate::models::captain::{CaptainStatus, GeoPoint, Vehicle, VehicleType};
    use crate::models::event::{ClientMessage, ServerEvent};
    use crate::models::identity::Identity;
    use crate::observability::metrics::Metrics;
    use crate::store::captains::CaptainDirectory;
    use crate::store::connections::{ConnectionHandle, ConnectionRegistry};
    use crate::store::interest::InterestRegistry;
    use crate::store::locations::LocationStore;

    struct Fixture {
        locations: Arc<LocationStore>,
        captains: Arc<CaptainDirectory>,
        registry: Arc<ConnectionRegistry>,
        interest: Arc<InterestRegistry>,
        dispatcher: Arc<LiveUpdateDispatcher>,
    }

    fn fixture(grace: Duration) -> Fixture {
        let metrics = Metrics::new();
        let locations = Arc::new(LocationStore::new());
        let captains = Arc::new(CaptainDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new(
            Duration::from_millis(100),
            metrics.clone(),
        ));
        let interest = Arc::new(InterestRegistry::new());
        let dispatcher = Arc::new(LiveUpdateDispatcher::new(
            locations.clone(),
            captains.clone(),
            registry.clone(),
            interest.clone(),
            grace,
            metrics,
        ));
        Fixture {
            locations,
            captains,
            registry,
            interest,
            dispatcher,
        }
    }

    fn register_captain(fixture: &Fixture) -> Uuid {
        let vehicle = Vehicle {
            color: "yellow".to_string(),
            plate: "KA 05 MN 4321".to_string(),
            capacity: 3,
            vehicle_type: VehicleType::Auto,
        };
        fixture
            .captains
            .register("Vikram".to_string(), vehicle, CaptainStatus::Available)
            .id
    }

    #[tokio::test]
    async fn location_frames_write_through_and_start_streaming() {
        let fixture = fixture(Duration::from_secs(30));
        let captain_id = register_captain(&fixture);
        let (handle, _rx) = ConnectionHandle::channel(8);
        let mut session = fixture
            .dispatcher
            .open_session(Identity::captain(captain_id), handle);
        assert_eq!(session.state(), SessionState::Connected);

        let point = GeoPoint::new(12.9716, 77.5946);
        let reply = session
            .handle(ClientMessage::UpdateLocation { location: point })
            .await
            .unwrap();

        assert!(matches!(reply, ServerEvent::LocationAccepted { .. }));
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(fixture.locations.get(&captain_id).unwrap().point, point);
    }

    #[tokio::test]
    async fn invalid_location_is_rejected_and_previous_kept() {
        let fixture = fixture(Duration::from_secs(30));
        let captain_id = register_captain(&fixture);
        let original = GeoPoint::new(12.0, 77.0);
        fixture
            .dispatcher
            .push_location(captain_id, original)
            .await
            .unwrap();

        let err = fixture
            .dispatcher
            .push_location(captain_id, GeoPoint::new(12.0, 200.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCoordinate(_)));
        assert_eq!(fixture.locations.get(&captain_id).unwrap().point, original);
    }

    #[tokio::test]
    async fn unknown_captain_cannot_push() {
        let fixture = fixture(Duration::from_secs(30));
        let err = fixture
            .dispatcher
            .push_location(Uuid::from_u128(99), GeoPoint::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn users_cannot_stream_locations() {
        let fixture = fixture(Duration::from_secs(30));
        let (handle, _rx) = ConnectionHandle::channel(8);
        let mut session = fixture
            .dispatcher
            .open_session(Identity::user(Uuid::from_u128(1)), handle);

        let err = session
            .handle(ClientMessage::UpdateLocation {
                location: GeoPoint::new(1.0, 1.0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn matched_rider_receives_location_changes() {
        let fixture = fixture(Duration::from_secs(30));
        let captain_id = register_captain(&fixture);
        let rider = Identity::user(Uuid::from_u128(500));
        let (rider_handle, mut rider_rx) = ConnectionHandle::channel(8);
        let _rider_session = fixture.dispatcher.open_session(rider, rider_handle);
        fixture.interest.watch(captain_id, rider);

        let point = GeoPoint::new(28.61, 77.21);
        fixture
            .dispatcher
            .push_location(captain_id, point)
            .await
            .unwrap();

        match rider_rx.recv().await {
            Some(ServerEvent::LocationChanged {
                captain_id: from,
                location,
                ..
            }) => {
                assert_eq!(from, captain_id);
                assert_eq!(location, point);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnected_watcher_does_not_fail_the_update() {
        let fixture = fixture(Duration::from_secs(30));
        let captain_id = register_captain(&fixture);
        fixture
            .interest
            .watch(captain_id, Identity::user(Uuid::from_u128(501)));

        let fix = fixture
            .dispatcher
            .push_location(captain_id, GeoPoint::new(28.6, 77.2))
            .await;
        assert!(fix.is_ok());
    }

    #[tokio::test]
    async fn disconnect_keeps_location_and_goes_offline_after_grace() {
        let fixture = fixture(Duration::from_millis(50));
        let captain_id = register_captain(&fixture);
        let identity = Identity::captain(captain_id);
        let (handle, _rx) = ConnectionHandle::channel(8);
        let mut session = fixture.dispatcher.open_session(identity, handle);
        session
            .handle(ClientMessage::UpdateLocation {
                location: GeoPoint::new(19.07, 72.87),
            })
            .await
            .unwrap();

        session.close();
        assert!(!fixture.registry.is_connected(&identity));
        assert_eq!(
            fixture.captains.get(&captain_id).unwrap().status,
            CaptainStatus::Available
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            fixture.captains.get(&captain_id).unwrap().status,
            CaptainStatus::Offline
        );
        assert!(fixture.locations.get(&captain_id).is_some());
    }

    #[tokio::test]
    async fn reconnect_within_grace_keeps_captain_available() {
        let fixture = fixture(Duration::from_millis(50));
        let captain_id = register_captain(&fixture);
        let identity = Identity::captain(captain_id);

        let (first, _first_rx) = ConnectionHandle::channel(8);
        fixture.dispatcher.open_session(identity, first).close();

        let (second, _second_rx) = ConnectionHandle::channel(8);
        let _session = fixture.dispatcher.open_session(identity, second);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            fixture.captains.get(&captain_id).unwrap().status,
            CaptainStatus::Available
        );
    }

    #[tokio::test]
    async fn stuck_watchers_do_not_stall_the_update() {
        let fixture = fixture(Duration::from_secs(30));
        let captain_id = register_captain(&fixture);

        let mut receivers = Vec::new();
        for n in 0..3 {
            let rider = Identity::user(Uuid::from_u128(600 + n));
            let (handle, rx) = ConnectionHandle::channel(1);
            receivers.push(rx);
            fixture.registry.register(rider, handle);
            fixture.registry.send_to(&rider, ServerEvent::Pong).await.unwrap();
            fixture.interest.watch(captain_id, rider);
        }

        // Each full queue costs one 100ms send timeout; in parallel that is paid once.
        let start = tokio::time::Instant::now();
        fixture
            .dispatcher
            .push_location(captain_id, GeoPoint::new(28.6, 77.2))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn notify_all_counts_reached_identities_concurrently() {
        let fixture = fixture(Duration::from_secs(30));
        let live = Identity::captain(Uuid::from_u128(700));
        let (live_handle, mut live_rx) = ConnectionHandle::channel(8);
        fixture.registry.register(live, live_handle);

        let mut targets = vec![live, Identity::captain(Uuid::from_u128(701))];
        let mut stuck_receivers = Vec::new();
        for n in 0..3 {
            let stuck = Identity::captain(Uuid::from_u128(710 + n));
            let (handle, rx) = ConnectionHandle::channel(1);
            stuck_receivers.push(rx);
            fixture.registry.register(stuck, handle);
            fixture.registry.send_to(&stuck, ServerEvent::Pong).await.unwrap();
            targets.push(stuck);
        }

        let start = tokio::time::Instant::now();
        let delivered = fixture
            .dispatcher
            .notify_all(&targets, &ServerEvent::Pong)
            .await;

        assert_eq!(delivered, 1);
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(live_rx.recv().await, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn only_the_latest_grace_timer_takes_the_captain_offline() {
        let fixture = fixture(Duration::from_millis(80));
        let captain_id = register_captain(&fixture);
        let identity = Identity::captain(captain_id);

        let (first, _first_rx) = ConnectionHandle::channel(8);
        fixture.dispatcher.open_session(identity, first).close();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (second, _second_rx) = ConnectionHandle::channel(8);
        fixture.dispatcher.open_session(identity, second).close();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The first timer would have fired by now had it not been aborted.
        assert_eq!(
            fixture.captains.get(&captain_id).unwrap().status,
            CaptainStatus::Available
        );
        assert!(fixture.dispatcher.pending_offline.contains_key(&captain_id));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            fixture.captains.get(&captain_id).unwrap().status,
            CaptainStatus::Offline
        );
        assert!(fixture.dispatcher.pending_offline.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn deleted_captain_leaves_no_location_behind() {
        let fixture = fixture(Duration::from_secs(30));

        for _ in 0..50 {
            let captain_id = register_captain(&fixture);
            let dispatcher = fixture.dispatcher.clone();
            let writer = tokio::spawn(async move {
                for step in 0..20 {
                    let point = GeoPoint::new(12.0 + step as f64 * 0.001, 77.0);
                    if dispatcher.push_location(captain_id, point).await.is_err() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            });

            tokio::task::yield_now().await;
            fixture.captains.soft_delete(&captain_id).unwrap();
            fixture.locations.remove(&captain_id);
            writer.await.unwrap();

            assert!(fixture.locations.get(&captain_id).is_none());
        }
    }

    #[tokio::test]
    async fn replaced_session_close_does_not_evict_new_connection() {
        let fixture = fixture(Duration::from_millis(50));
        let captain_id = register_captain(&fixture);
        let identity = Identity::captain(captain_id);

        let (first, _first_rx) = ConnectionHandle::channel(8);
        let old_session = fixture.dispatcher.open_session(identity, first);
        let (second, mut second_rx) = ConnectionHandle::channel(8);
        let _new_session = fixture.dispatcher.open_session(identity, second);

        old_session.close();
        assert!(fixture.registry.is_connected(&identity));

        fixture
            .dispatcher
            .notify(&identity, ServerEvent::Pong)
            .await
            .unwrap();
        assert_eq!(second_rx.recv().await, Some(ServerEvent::Pong));
    }
}
