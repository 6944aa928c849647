use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::captain::GeoPoint;
use crate::models::identity::Role;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { role: Role, id: Uuid },
    UpdateLocation { location: GeoPoint },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined {
        role: Role,
        id: Uuid,
    },
    LocationAccepted {
        recorded_at: DateTime<Utc>,
    },
    LocationChanged {
        captain_id: Uuid,
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    },
    NewRide {
        ride_id: Uuid,
        user_id: Uuid,
        pickup: GeoPoint,
        pickup_address: Option<String>,
        destination_address: Option<String>,
    },
    RideAccepted {
        ride_id: Uuid,
        captain_id: Uuid,
    },
    RideCompleted {
        ride_id: Uuid,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}
