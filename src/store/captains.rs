use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::captain::{Captain, CaptainStatus, Vehicle};

#[derive(Default)]
pub struct CaptainDirectory {
    captains: DashMap<Uuid, Captain>,
}

impl CaptainDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: String, vehicle: Vehicle, status: CaptainStatus) -> Captain {
        let now = Utc::now();
        let captain = Captain {
            id: Uuid::new_v4(),
            name,
            vehicle,
            status,
            last_available_at: (status == CaptainStatus::Available).then_some(now),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.captains.insert(captain.id, captain.clone());
        captain
    }

    pub fn get(&self, id: &Uuid) -> Result<Captain, AppError> {
        self.captains
            .get(id)
            .filter(|entry| !entry.is_deleted())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("captain {id} not found")))
    }

    pub fn list(&self) -> Vec<Captain> {
        self.captains
            .iter()
            .filter(|entry| !entry.is_deleted())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.captains.iter().filter(|entry| !entry.is_deleted()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_status(&self, id: &Uuid, status: CaptainStatus) -> Result<Captain, AppError> {
        let mut captain = self
            .captains
            .get_mut(id)
            .filter(|entry| !entry.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("captain {id} not found")))?;

        let now = Utc::now();
        if status == CaptainStatus::Available && captain.status != CaptainStatus::Available {
            captain.last_available_at = Some(now);
        }
        captain.status = status;
        captain.updated_at = now;

        Ok(captain.clone())
    }

    /// Atomically moves an available captain to `next`; fails with `Conflict` otherwise.
    pub fn claim_available(&self, id: &Uuid, next: CaptainStatus) -> Result<Captain, AppError> {
        let mut captain = self
            .captains
            .get_mut(id)
            .filter(|entry| !entry.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("captain {id} not found")))?;

        if captain.status != CaptainStatus::Available {
            return Err(AppError::Conflict(format!("captain {id} is not available")));
        }

        captain.status = next;
        captain.updated_at = Utc::now();
        Ok(captain.clone())
    }

    pub fn mark_offline_if_available(&self, id: &Uuid) -> bool {
        match self.captains.get_mut(id) {
            Some(mut captain) if captain.status == CaptainStatus::Available => {
                captain.status = CaptainStatus::Offline;
                captain.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn soft_delete(&self, id: &Uuid) -> Result<Captain, AppError> {
        let mut captain = self
            .captains
            .get_mut(id)
            .filter(|entry| !entry.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("captain {id} not found")))?;

        let now = Utc::now();
        captain.status = CaptainStatus::Offline;
        captain.deleted_at = Some(now);
        captain.updated_at = now;

        Ok(captain.clone())
    }
}
