use async_trait::async_trait;
use tracing::debug;

use authgate_domain::{DomainError, DomainResult, Sensor, SensorId, SensorRepository};

use crate::client::PostgresClient;
use crate::models::SensorRow;

/// PostgreSQL implementation of the sensor repository port.
#[derive(Clone)]
pub struct PostgresSensorRepository {
    client: PostgresClient,
}

impl PostgresSensorRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorRepository for PostgresSensorRepository {
    async fn get_sensor(&self, id: &SensorId) -> DomainResult<Option<Sensor>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT sensor_id, owner_id, secret FROM sensors WHERE sensor_id = $1",
                &[&id.to_string()],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                let sensor_row = SensorRow {
                    sensor_id: row.get(0),
                    owner_id: row.get(1),
                    secret: row.get(2),
                };
                Ok(Some(sensor_row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn get_all_sensors(&self) -> DomainResult<Vec<Sensor>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query("SELECT sensor_id, owner_id, secret FROM sensors", &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let sensors = rows
            .iter()
            .map(|row| {
                let sensor_row = SensorRow {
                    sensor_id: row.get(0),
                    owner_id: row.get(1),
                    secret: row.get(2),
                };
                sensor_row.try_into()
            })
            .collect::<DomainResult<Vec<Sensor>>>()?;

        debug!("loaded {} sensors", sensors.len());
        Ok(sensors)
    }
}
