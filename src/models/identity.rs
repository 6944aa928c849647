use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Captain,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub role: Role,
    pub id: Uuid,
}

impl Identity {
    pub fn user(id: Uuid) -> Self {
        Self {
            role: Role::User,
            id,
        }
    }

    pub fn captain(id: Uuid) -> Self {
        Self {
            role: Role::Captain,
            id,
        }
    }

    pub fn captain_id(&self) -> Option<Uuid> {
        match self.role {
            Role::Captain => Some(self.id),
            Role::User => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::User => write!(f, "user:{}", self.id),
            Role::Captain => write!(f, "captain:{}", self.id),
        }
    }
}
