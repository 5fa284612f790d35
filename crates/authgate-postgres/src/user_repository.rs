use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use authgate_domain::{DomainError, DomainResult, User, UserRepository};

use crate::client::PostgresClient;
use crate::models::UserRow;

/// PostgreSQL implementation of the user repository port.
#[derive(Clone)]
pub struct PostgresUserRepository {
    client: PostgresClient,
}

impl PostgresUserRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn get_user(&self, id: &Uuid) -> DomainResult<Option<User>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT user_id, lockout, banned FROM users WHERE user_id = $1",
                &[id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| {
            UserRow {
                user_id: row.get(0),
                lockout: row.get(1),
                banned: row.get(2),
            }
            .into()
        }))
    }

    async fn get_all_users(&self) -> DomainResult<Vec<User>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query("SELECT user_id, lockout, banned FROM users", &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let users: Vec<User> = rows
            .iter()
            .map(|row| {
                UserRow {
                    user_id: row.get(0),
                    lockout: row.get(1),
                    banned: row.get(2),
                }
                .into()
            })
            .collect();

        debug!("loaded {} users", users.len());
        Ok(users)
    }
}
