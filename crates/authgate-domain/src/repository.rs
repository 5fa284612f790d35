use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainResult;
use crate::models::{ApiKey, Measurement, Sensor, User};
use crate::sensor_id::SensorId;

/// Read-only access to the sensor store. Infrastructure crates (e.g.
/// authgate-postgres) implement this trait; it must be safe to call
/// concurrently from any worker.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorRepository: Send + Sync {
    /// Look up a single sensor by its identifier.
    async fn get_sensor(&self, id: &SensorId) -> DomainResult<Option<Sensor>>;

    /// List every sensor, for cold-start cache population.
    async fn get_all_sensors(&self) -> DomainResult<Vec<Sensor>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &Uuid) -> DomainResult<Option<User>>;

    async fn get_all_users(&self) -> DomainResult<Vec<User>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Look up a sensor-bound key by its key string.
    async fn get_sensor_key(&self, key: &str) -> DomainResult<Option<ApiKey>>;

    async fn get_all_sensor_keys(&self) -> DomainResult<Vec<ApiKey>>;
}

/// Outgoing publication port for authorized measurements.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MeasurementProducer: Send + Sync {
    async fn publish_measurements(&self, batch: &[Measurement]) -> DomainResult<()>;
}
