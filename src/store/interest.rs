use dashmap::DashMap;
use uuid::Uuid;

use crate::models::identity::Identity;

#[derive(Default)]
pub struct InterestRegistry {
    watchers: DashMap<Uuid, Vec<Identity>>,
}

impl InterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, captain_id: Uuid, watcher: Identity) {
        let mut entry = self.watchers.entry(captain_id).or_default();
        if !entry.contains(&watcher) {
            entry.push(watcher);
        }
    }

    pub fn unwatch(&self, captain_id: &Uuid, watcher: &Identity) {
        self.watchers.remove_if_mut(captain_id, |_, list| {
            list.retain(|existing| existing != watcher);
            list.is_empty()
        });
    }

    pub fn clear(&self, captain_id: &Uuid) {
        self.watchers.remove(captain_id);
    }

    pub fn watchers(&self, captain_id: &Uuid) -> Vec<Identity> {
        self.watchers
            .get(captain_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}
