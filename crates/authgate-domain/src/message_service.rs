use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::error::{DomainError, DomainResult};
use crate::handler::MeasurementHandler;
use crate::models::{Decision, Measurement, RejectReason};
use crate::repository::{
    ApiKeyRepository, MeasurementProducer, SensorRepository, UserRepository,
};
use crate::sensor_id::SensorId;

#[derive(Debug, Clone)]
pub struct MessageServiceConfig {
    /// Number of handler slots the round-robin index distributes over.
    pub workers: usize,
    /// Maximum messages drained per `process` cycle; also the ingress
    /// buffer capacity (senders await when it is full).
    pub internal_batch_size: usize,
    /// Maximum accepted measurements per outgoing publication.
    pub publish_chunk_size: usize,
    pub cache_ttl: Duration,
    pub repository_timeout: Duration,
}

impl Default for MessageServiceConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            internal_batch_size: 10_000,
            publish_chunk_size: 1_000,
            cache_ttl: Duration::from_secs(300),
            repository_timeout: Duration::from_secs(2),
        }
    }
}

/// Counters for one `process` cycle. The duration feeds the external
/// scheduler that decides the polling cadence.
#[derive(Debug)]
pub struct CycleReport {
    pub drained: usize,
    pub published: usize,
    pub rejected: HashMap<RejectReason, usize>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Orchestrator over the authorization data path.
///
/// Owns the bounded ingress queue, the entity cache, the handler pool and
/// the publish path. `add_measurement` and `process` are safe to call
/// concurrently; the round-robin index is shared across ticks so load
/// balances over the service lifetime.
pub struct MessageService {
    ingress_tx: mpsc::Sender<String>,
    ingress_rx: Mutex<mpsc::Receiver<String>>,
    handlers: Vec<Arc<MeasurementHandler>>,
    next_handler: AtomicUsize,
    cache: Arc<EntityCache>,
    producer: Arc<dyn MeasurementProducer>,
    sensors: Arc<dyn SensorRepository>,
    users: Arc<dyn UserRepository>,
    keys: Arc<dyn ApiKeyRepository>,
    config: MessageServiceConfig,
    total_published: AtomicU64,
    total_rejected: AtomicU64,
}

impl MessageService {
    pub fn new(
        sensors: Arc<dyn SensorRepository>,
        users: Arc<dyn UserRepository>,
        keys: Arc<dyn ApiKeyRepository>,
        producer: Arc<dyn MeasurementProducer>,
        config: MessageServiceConfig,
    ) -> Self {
        let cache = Arc::new(EntityCache::new(config.cache_ttl));
        let workers = config.workers.max(1);
        let handlers = (0..workers)
            .map(|_| {
                Arc::new(MeasurementHandler::new(
                    Arc::clone(&cache),
                    Arc::clone(&sensors),
                    Arc::clone(&users),
                    Arc::clone(&keys),
                    config.repository_timeout,
                ))
            })
            .collect();

        let (ingress_tx, ingress_rx) = mpsc::channel(config.internal_batch_size.max(1));

        Self {
            ingress_tx,
            ingress_rx: Mutex::new(ingress_rx),
            handlers,
            next_handler: AtomicUsize::new(0),
            cache,
            producer,
            sensors,
            users,
            keys,
            config,
            total_published: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Enqueue one raw payload. Awaits while the ingress buffer is at
    /// capacity, giving bounded-with-backpressure semantics under sustained
    /// overload.
    pub async fn add_measurement(&self, raw: String) -> DomainResult<()> {
        self.ingress_tx
            .send(raw)
            .await
            .map_err(|_| DomainError::IngressClosed)
    }

    /// Run one processing cycle: drain a bounded batch, fan out across the
    /// handler pool, republish accepted measurements, report counters.
    pub async fn process(&self) -> CycleReport {
        let started = Instant::now();

        let batch = self.drain_batch().await;
        let drained = batch.len();
        if drained == 0 {
            return CycleReport {
                drained: 0,
                published: 0,
                rejected: HashMap::new(),
                duration: started.elapsed(),
            };
        }

        let partitions = self.partition(batch);
        let mut tasks = JoinSet::new();
        for (slot, partition) in partitions.into_iter().enumerate() {
            if partition.is_empty() {
                continue;
            }
            let handler = Arc::clone(&self.handlers[slot]);
            tasks.spawn(async move {
                let mut outcomes = Vec::with_capacity(partition.len());
                for raw in &partition {
                    outcomes.push(handler.handle(raw).await);
                }
                outcomes
            });
        }

        let mut accepted = Vec::new();
        let mut rejected: HashMap<RejectReason, usize> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome.decision {
                            Decision::Accepted => accepted.extend(outcome.measurement),
                            Decision::Rejected(reason) => {
                                *rejected.entry(reason).or_default() += 1;
                            }
                        }
                    }
                }
                Err(e) => error!(error = %e, "measurement partition task failed"),
            }
        }

        let published = self.publish_accepted(accepted).await;
        let rejected_total: usize = rejected.values().sum();
        self.total_published
            .fetch_add(published as u64, Ordering::Relaxed);
        self.total_rejected
            .fetch_add(rejected_total as u64, Ordering::Relaxed);

        let duration = started.elapsed();
        info!(
            drained,
            published,
            rejected = rejected_total,
            duration_ms = duration.as_millis() as u64,
            "processed measurement batch"
        );

        CycleReport {
            drained,
            published,
            rejected,
            duration,
        }
    }

    /// Bulk-populate all three cache families from the repositories.
    pub async fn preload(&self) -> DomainResult<()> {
        let now = Instant::now();
        let sensors = self.sensors.get_all_sensors().await?;
        let users = self.users.get_all_users().await?;
        let keys = self.keys.get_all_sensor_keys().await?;

        info!(
            sensors = sensors.len(),
            users = users.len(),
            keys = keys.len(),
            "preloading entity cache"
        );

        self.cache.append_sensors(sensors, now);
        self.cache.append_users(users, now);
        self.cache.append_keys(keys, now);
        Ok(())
    }

    pub fn flush_sensor(&self, id: &SensorId) -> bool {
        self.cache.flush_sensor(id)
    }

    pub fn flush_user(&self, id: &Uuid) -> bool {
        self.cache.flush_user(id)
    }

    pub fn flush_key(&self, key: &str) -> bool {
        self.cache.flush_key(key)
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Lifetime (published, rejected) totals across all cycles.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_published.load(Ordering::Relaxed),
            self.total_rejected.load(Ordering::Relaxed),
        )
    }

    async fn drain_batch(&self) -> Vec<String> {
        let mut rx = self.ingress_rx.lock().await;
        let mut batch = Vec::new();
        while batch.len() < self.config.internal_batch_size {
            match rx.try_recv() {
                Ok(raw) => batch.push(raw),
                Err(_) => break,
            }
        }
        batch
    }

    /// Assign messages to handler slots via the shared wrapping index.
    fn partition(&self, batch: Vec<String>) -> Vec<Vec<String>> {
        let mut partitions = vec![Vec::new(); self.handlers.len()];
        for raw in batch {
            let slot = self.next_handler.fetch_add(1, Ordering::Relaxed) % self.handlers.len();
            partitions[slot].push(raw);
        }
        partitions
    }

    async fn publish_accepted(&self, accepted: Vec<Measurement>) -> usize {
        if accepted.is_empty() {
            return 0;
        }

        let mut published = 0;
        for chunk in accepted.chunks(self.config.publish_chunk_size.max(1)) {
            match self.producer.publish_measurements(chunk).await {
                Ok(()) => published += chunk.len(),
                Err(e) => {
                    // No retry within the tick: the source is a continuous
                    // stream and the next cycle processes fresh data.
                    error!(
                        error = %e,
                        dropped = chunk.len(),
                        "failed to publish accepted measurements"
                    );
                }
            }
        }
        published
    }
}
