use authgate_domain::{ApiKey, ApiKeyKind, DomainError, Sensor, User};
use uuid::Uuid;

/// Sensor row as stored: the identifier is kept as its 24-character hex
/// rendering.
#[derive(Debug, Clone)]
pub struct SensorRow {
    pub sensor_id: String,
    pub owner_id: Uuid,
    pub secret: String,
}

impl TryFrom<SensorRow> for Sensor {
    type Error = DomainError;

    fn try_from(row: SensorRow) -> Result<Self, Self::Error> {
        Ok(Sensor {
            id: row.sensor_id.parse()?,
            owner: row.owner_id,
            secret: row.secret,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UserRow {
    pub user_id: Uuid,
    pub lockout: bool,
    pub banned: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.user_id,
            lockout: row.lockout,
            banned: row.banned,
        }
    }
}

/// Key kinds are stored as a smallint; 0 is the sensor-bound kind.
pub const KEY_TYPE_SENSOR: i16 = 0;

#[derive(Debug, Clone)]
pub struct ApiKeyRow {
    pub api_key: String,
    pub user_id: Uuid,
    pub key_type: i16,
    pub read_only: bool,
    pub revoked: bool,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        let kind = if row.key_type == KEY_TYPE_SENSOR {
            ApiKeyKind::Sensor
        } else {
            ApiKeyKind::System
        };
        ApiKey {
            key: row.api_key,
            user_id: row.user_id,
            kind,
            read_only: row.read_only,
            revoked: row.revoked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_row_converts() {
        let row = SensorRow {
            sensor_id: "5c7c3bbd80e8ae3154d04912".to_string(),
            owner_id: Uuid::new_v4(),
            secret: "s3cr3t".to_string(),
        };

        let sensor = Sensor::try_from(row.clone()).unwrap();
        assert_eq!(sensor.id.to_string(), row.sensor_id);
        assert_eq!(sensor.owner, row.owner_id);
    }

    #[test]
    fn test_sensor_row_rejects_bad_id() {
        let row = SensorRow {
            sensor_id: "short".to_string(),
            owner_id: Uuid::new_v4(),
            secret: "s3cr3t".to_string(),
        };

        assert!(matches!(
            Sensor::try_from(row),
            Err(DomainError::InvalidSensorId(_))
        ));
    }

    #[test]
    fn test_api_key_row_maps_kind() {
        let row = ApiKeyRow {
            api_key: "k".to_string(),
            user_id: Uuid::new_v4(),
            key_type: KEY_TYPE_SENSOR,
            read_only: false,
            revoked: true,
        };
        let key = ApiKey::from(row);
        assert_eq!(key.kind, ApiKeyKind::Sensor);
        assert!(key.revoked);

        let row = ApiKeyRow {
            api_key: "k".to_string(),
            user_id: Uuid::new_v4(),
            key_type: 2,
            read_only: false,
            revoked: false,
        };
        assert_eq!(ApiKey::from(row).kind, ApiKeyKind::System);
    }
}
