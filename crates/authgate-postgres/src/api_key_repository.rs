use async_trait::async_trait;
use tracing::debug;

use authgate_domain::{ApiKey, ApiKeyRepository, DomainError, DomainResult};

use crate::client::PostgresClient;
use crate::models::{ApiKeyRow, KEY_TYPE_SENSOR};

/// PostgreSQL implementation of the API key repository port. Only
/// sensor-bound keys are served; other key classes live on a different
/// authorization path.
#[derive(Clone)]
pub struct PostgresApiKeyRepository {
    client: PostgresClient,
}

impl PostgresApiKeyRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get_sensor_key(&self, key: &str) -> DomainResult<Option<ApiKey>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT api_key, user_id, key_type, read_only, revoked
                 FROM api_keys
                 WHERE api_key = $1 AND key_type = $2",
                &[&key, &KEY_TYPE_SENSOR],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| {
            ApiKeyRow {
                api_key: row.get(0),
                user_id: row.get(1),
                key_type: row.get(2),
                read_only: row.get(3),
                revoked: row.get(4),
            }
            .into()
        }))
    }

    async fn get_all_sensor_keys(&self) -> DomainResult<Vec<ApiKey>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT api_key, user_id, key_type, read_only, revoked
                 FROM api_keys
                 WHERE key_type = $1",
                &[&KEY_TYPE_SENSOR],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let keys: Vec<ApiKey> = rows
            .iter()
            .map(|row| {
                ApiKeyRow {
                    api_key: row.get(0),
                    user_id: row.get(1),
                    key_type: row.get(2),
                    read_only: row.get(3),
                    revoked: row.get(4),
                }
                .into()
            })
            .collect();

        debug!("loaded {} sensor keys", keys.len());
        Ok(keys)
    }
}
