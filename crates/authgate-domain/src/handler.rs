use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::error::{DomainError, DomainResult};
use crate::models::{ApiKey, Decision, Measurement, RejectReason, Sensor, User};
use crate::repository::{ApiKeyRepository, SensorRepository, UserRepository};
use crate::sensor_id::SensorId;
use crate::validator::MeasurementValidator;

/// Outcome of handling one raw payload. The parsed measurement is carried
/// only for accepted outcomes so the orchestrator can republish without
/// re-parsing.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub decision: Decision,
    pub measurement: Option<Measurement>,
}

impl HandlerOutcome {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            decision: Decision::Rejected(reason),
            measurement: None,
        }
    }
}

/// Per-worker-slot processing unit: parse, resolve the credential triplet
/// (cache first, repository fallback), validate.
///
/// Holds no mutable state across calls and is safe to invoke concurrently
/// from different worker slots. Concurrent repository fallbacks for the same
/// cold identifier are acceptable; cache appends are last-write-wins.
pub struct MeasurementHandler {
    cache: Arc<EntityCache>,
    sensors: Arc<dyn SensorRepository>,
    users: Arc<dyn UserRepository>,
    keys: Arc<dyn ApiKeyRepository>,
    validator: MeasurementValidator,
    repository_timeout: Duration,
}

impl MeasurementHandler {
    pub fn new(
        cache: Arc<EntityCache>,
        sensors: Arc<dyn SensorRepository>,
        users: Arc<dyn UserRepository>,
        keys: Arc<dyn ApiKeyRepository>,
        repository_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            sensors,
            users,
            keys,
            validator: MeasurementValidator::new(),
            repository_timeout,
        }
    }

    pub async fn handle(&self, raw: &str) -> HandlerOutcome {
        let measurement: Measurement = match serde_json::from_str(raw) {
            Ok(measurement) => measurement,
            Err(e) => {
                debug!(error = %e, "dropping malformed measurement payload");
                return HandlerOutcome::rejected(RejectReason::ParseError);
            }
        };

        let now = Instant::now();

        let sensor = match self.resolve_sensor(&measurement.sensor_id, now).await {
            Ok(sensor) => sensor,
            Err(e) => {
                warn!(sensor_id = %measurement.sensor_id, error = %e, "sensor resolution failed");
                return HandlerOutcome::rejected(RejectReason::ResolutionFailed);
            }
        };

        // User and key lookups are keyed off the resolved sensor; without
        // one the validator rejects on the secret check regardless.
        let (user, key) = match &sensor {
            Some(sensor) => {
                let user = match self.resolve_user(&sensor.owner, now).await {
                    Ok(user) => user,
                    Err(e) => {
                        warn!(user_id = %sensor.owner, error = %e, "user resolution failed");
                        return HandlerOutcome::rejected(RejectReason::ResolutionFailed);
                    }
                };
                let key = match self.resolve_key(&sensor.secret, now).await {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(sensor_id = %sensor.id, error = %e, "api key resolution failed");
                        return HandlerOutcome::rejected(RejectReason::ResolutionFailed);
                    }
                };
                (user, key)
            }
            None => (None, None),
        };

        let decision =
            self.validator
                .validate(&measurement, sensor.as_ref(), user.as_ref(), key.as_ref());
        let measurement = decision.is_accepted().then_some(measurement);

        HandlerOutcome {
            decision,
            measurement,
        }
    }

    async fn resolve_sensor(&self, id: &SensorId, now: Instant) -> DomainResult<Option<Sensor>> {
        if let Some(sensor) = self.cache.sensor(id, now) {
            return Ok(Some(sensor));
        }

        let fetched = self.bounded(self.sensors.get_sensor(id)).await?;
        if let Some(sensor) = &fetched {
            self.cache.append_sensors([sensor.clone()], now);
        }
        Ok(fetched)
    }

    async fn resolve_user(&self, id: &Uuid, now: Instant) -> DomainResult<Option<User>> {
        if let Some(user) = self.cache.user(id, now) {
            return Ok(Some(user));
        }

        let fetched = self.bounded(self.users.get_user(id)).await?;
        if let Some(user) = &fetched {
            self.cache.append_users([*user], now);
        }
        Ok(fetched)
    }

    async fn resolve_key(&self, key: &str, now: Instant) -> DomainResult<Option<ApiKey>> {
        if let Some(key) = self.cache.key(key, now) {
            return Ok(Some(key));
        }

        let fetched = self.bounded(self.keys.get_sensor_key(key)).await?;
        if let Some(key) = &fetched {
            self.cache.append_keys([key.clone()], now);
        }
        Ok(fetched)
    }

    /// Bound a repository fallback by the configured timeout; a timed-out
    /// lookup is a resolution failure, never a stalled batch.
    async fn bounded<T>(
        &self,
        lookup: impl std::future::Future<Output = DomainResult<T>>,
    ) -> DomainResult<T> {
        tokio::time::timeout(self.repository_timeout, lookup)
            .await
            .map_err(|_| DomainError::RepositoryTimeout(self.repository_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApiKeyKind;
    use crate::repository::{
        MockApiKeyRepository, MockSensorRepository, MockUserRepository,
    };
    use async_trait::async_trait;

    const REPO_TIMEOUT: Duration = Duration::from_millis(200);

    fn fixtures() -> (Sensor, User, ApiKey) {
        let owner = Uuid::new_v4();
        let sensor = Sensor {
            id: "5c7c3bbd80e8ae3154d04912".parse().unwrap(),
            owner,
            secret: "s3cr3t".to_string(),
        };
        let user = User {
            id: owner,
            lockout: false,
            banned: false,
        };
        let key = ApiKey {
            key: "s3cr3t".to_string(),
            user_id: owner,
            kind: ApiKeyKind::Sensor,
            read_only: false,
            revoked: false,
        };
        (sensor, user, key)
    }

    fn raw_measurement(sensor_id: &SensorId, secret: &str) -> String {
        serde_json::json!({
            "sensorId": sensor_id.to_string(),
            "secret": secret,
            "data": {"temp": {"value": 21.5, "unit": "C"}},
        })
        .to_string()
    }

    fn handler(
        cache: Arc<EntityCache>,
        sensors: MockSensorRepository,
        users: MockUserRepository,
        keys: MockApiKeyRepository,
    ) -> MeasurementHandler {
        MeasurementHandler::new(
            cache,
            Arc::new(sensors),
            Arc::new(users),
            Arc::new(keys),
            REPO_TIMEOUT,
        )
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let cache = Arc::new(EntityCache::new(Duration::from_secs(60)));
        let h = handler(
            cache,
            MockSensorRepository::new(),
            MockUserRepository::new(),
            MockApiKeyRepository::new(),
        );

        let outcome = h.handle("not json at all").await;
        assert_eq!(outcome.decision, Decision::Rejected(RejectReason::ParseError));
        assert!(outcome.measurement.is_none());
    }

    #[tokio::test]
    async fn test_cold_sensor_resolves_once_and_populates_cache() {
        let (sensor, user, key) = fixtures();
        let cache = Arc::new(EntityCache::new(Duration::from_secs(60)));

        let mut sensors = MockSensorRepository::new();
        let sensor_clone = sensor.clone();
        sensors
            .expect_get_sensor()
            .withf({
                let id = sensor.id;
                move |got| *got == id
            })
            .times(1)
            .returning(move |_| Ok(Some(sensor_clone.clone())));

        let mut users = MockUserRepository::new();
        users
            .expect_get_user()
            .times(1)
            .returning(move |_| Ok(Some(user)));

        let mut keys = MockApiKeyRepository::new();
        let key_clone = key.clone();
        keys.expect_get_sensor_key()
            .times(1)
            .returning(move |_| Ok(Some(key_clone.clone())));

        let h = handler(Arc::clone(&cache), sensors, users, keys);

        let outcome = h.handle(&raw_measurement(&sensor.id, "s3cr3t")).await;
        assert_eq!(outcome.decision, Decision::Accepted);
        assert!(outcome.measurement.is_some());

        // Subsequent lookups hit the cache; the mocks would panic on a
        // second repository call.
        let outcome = h.handle(&raw_measurement(&sensor.id, "s3cr3t")).await;
        assert_eq!(outcome.decision, Decision::Accepted);
        assert!(cache.contains_sensor(&sensor.id));
    }

    #[tokio::test]
    async fn test_unknown_sensor_rejects_invalid_secret() {
        let cache = Arc::new(EntityCache::new(Duration::from_secs(60)));

        let mut sensors = MockSensorRepository::new();
        sensors.expect_get_sensor().times(1).returning(|_| Ok(None));

        let h = handler(
            cache,
            sensors,
            MockUserRepository::new(),
            MockApiKeyRepository::new(),
        );

        let id: SensorId = "5c7c3bbd80e8ae3154d04912".parse().unwrap();
        let outcome = h.handle(&raw_measurement(&id, "whatever")).await;
        assert_eq!(
            outcome.decision,
            Decision::Rejected(RejectReason::InvalidSecret)
        );
    }

    #[tokio::test]
    async fn test_repository_error_is_resolution_failure() {
        let cache = Arc::new(EntityCache::new(Duration::from_secs(60)));

        let mut sensors = MockSensorRepository::new();
        sensors
            .expect_get_sensor()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused").into()));

        let h = handler(
            cache,
            sensors,
            MockUserRepository::new(),
            MockApiKeyRepository::new(),
        );

        let id: SensorId = "5c7c3bbd80e8ae3154d04912".parse().unwrap();
        let outcome = h.handle(&raw_measurement(&id, "s3cr3t")).await;
        assert_eq!(
            outcome.decision,
            Decision::Rejected(RejectReason::ResolutionFailed)
        );
    }

    /// Repository stub that never answers within the handler timeout.
    struct StalledSensorRepository;

    #[async_trait]
    impl SensorRepository for StalledSensorRepository {
        async fn get_sensor(&self, _id: &SensorId) -> DomainResult<Option<Sensor>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn get_all_sensors(&self) -> DomainResult<Vec<Sensor>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_repository_timeout_is_resolution_failure() {
        let cache = Arc::new(EntityCache::new(Duration::from_secs(60)));
        let h = MeasurementHandler::new(
            cache,
            Arc::new(StalledSensorRepository),
            Arc::new(MockUserRepository::new()),
            Arc::new(MockApiKeyRepository::new()),
            Duration::from_millis(50),
        );

        let id: SensorId = "5c7c3bbd80e8ae3154d04912".parse().unwrap();
        let outcome = h.handle(&raw_measurement(&id, "s3cr3t")).await;
        assert_eq!(
            outcome.decision,
            Decision::Rejected(RejectReason::ResolutionFailed)
        );
    }
}
