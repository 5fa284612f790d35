use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{ApiKey, Sensor, User};
use crate::sensor_id::SensorId;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    refreshed_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.refreshed_at) <= ttl
    }
}

/// Time-aware in-memory cache for the three credential families.
///
/// Reads take a shared lock and may run concurrently; bulk appends take the
/// exclusive lock for their family. Staleness is evaluated lazily against
/// the `now` supplied by the caller: an entry past its TTL reads as a miss
/// but stays in the map until the next append or an explicit flush.
pub struct EntityCache {
    ttl: Duration,
    sensors: RwLock<HashMap<SensorId, CacheEntry<Sensor>>>,
    users: RwLock<HashMap<Uuid, CacheEntry<User>>>,
    keys: RwLock<HashMap<String, CacheEntry<ApiKey>>>,
}

impl EntityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sensors: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn append_sensors(&self, sensors: impl IntoIterator<Item = Sensor>, now: Instant) {
        let mut map = self.sensors.write();
        for sensor in sensors {
            map.insert(
                sensor.id,
                CacheEntry {
                    value: sensor,
                    refreshed_at: now,
                },
            );
        }
    }

    pub fn append_users(&self, users: impl IntoIterator<Item = User>, now: Instant) {
        let mut map = self.users.write();
        for user in users {
            map.insert(
                user.id,
                CacheEntry {
                    value: user,
                    refreshed_at: now,
                },
            );
        }
    }

    pub fn append_keys(&self, keys: impl IntoIterator<Item = ApiKey>, now: Instant) {
        let mut map = self.keys.write();
        for key in keys {
            map.insert(
                key.key.clone(),
                CacheEntry {
                    value: key,
                    refreshed_at: now,
                },
            );
        }
    }

    pub fn sensor(&self, id: &SensorId, now: Instant) -> Option<Sensor> {
        let map = self.sensors.read();
        map.get(id)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn user(&self, id: &Uuid, now: Instant) -> Option<User> {
        let map = self.users.read();
        map.get(id)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value)
    }

    pub fn key(&self, key: &str, now: Instant) -> Option<ApiKey> {
        let map = self.keys.read();
        map.get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn flush_sensor(&self, id: &SensorId) -> bool {
        self.sensors.write().remove(id).is_some()
    }

    pub fn flush_user(&self, id: &Uuid) -> bool {
        self.users.write().remove(id).is_some()
    }

    pub fn flush_key(&self, key: &str) -> bool {
        self.keys.write().remove(key).is_some()
    }

    /// True if an entry exists for the id, regardless of staleness.
    pub fn contains_sensor(&self, id: &SensorId) -> bool {
        self.sensors.read().contains_key(id)
    }

    pub fn contains_user(&self, id: &Uuid) -> bool {
        self.users.read().contains_key(id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.read().contains_key(key)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }
}
