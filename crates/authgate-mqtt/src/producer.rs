use async_trait::async_trait;
use authgate_domain::{DomainError, DomainResult, Measurement, MeasurementProducer};
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Publishes accepted measurement batches as JSON arrays on the bulk topic.
///
/// Delivery is fire-and-forget at the cycle level: a failed publish surfaces
/// as an error to the caller, which logs and drops the batch.
pub struct MqttMeasurementProducer {
    client: AsyncClient,
    topic: String,
}

impl MqttMeasurementProducer {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }
}

pub(crate) fn encode_batch(batch: &[Measurement]) -> DomainResult<Vec<u8>> {
    serde_json::to_vec(batch).map_err(|e| DomainError::TransportError(e.to_string()))
}

#[async_trait]
impl MeasurementProducer for MqttMeasurementProducer {
    async fn publish_measurements(&self, batch: &[Measurement]) -> DomainResult<()> {
        let payload = encode_batch(batch)?;

        debug!(
            topic = %self.topic,
            count = batch.len(),
            size_bytes = payload.len(),
            "publishing measurement batch"
        );

        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DomainError::TransportError(e.to_string()))?;

        Ok(())
    }
}
