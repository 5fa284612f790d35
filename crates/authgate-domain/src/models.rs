use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sensor_id::SensorId;

/// A registered sensor. Immutable once loaded; replaced wholesale on cache
/// refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: SensorId,
    pub owner: Uuid,
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Temporarily suspended.
    pub lockout: bool,
    /// Permanently suspended.
    pub banned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyKind {
    /// Bound to a sensor; the key string doubles as the sensor secret.
    Sensor,
    /// Any other key class; never valid for measurement submission.
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    pub key: String,
    pub user_id: Uuid,
    pub kind: ApiKeyKind,
    pub read_only: bool,
    pub revoked: bool,
}

/// One parsed measurement.
///
/// `data` is opaque telemetry carried through verbatim. The credential claim
/// is never serialized on the outgoing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub sensor_id: SensorId,
    #[serde(skip_serializing)]
    pub secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Why a measurement was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    ParseError,
    InvalidSecret,
    UnknownOwner,
    UserBanned,
    UserLockedOut,
    KeyRevoked,
    KeyReadOnly,
    KeyOwnershipMismatch,
    /// Transient repository failure or timeout while resolving credentials.
    ResolutionFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::ParseError => "parse_error",
            RejectReason::InvalidSecret => "invalid_secret",
            RejectReason::UnknownOwner => "unknown_owner",
            RejectReason::UserBanned => "user_banned",
            RejectReason::UserLockedOut => "user_locked_out",
            RejectReason::KeyRevoked => "key_revoked",
            RejectReason::KeyReadOnly => "key_read_only",
            RejectReason::KeyOwnershipMismatch => "key_ownership_mismatch",
            RejectReason::ResolutionFailed => "resolution_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(RejectReason),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_parses_wire_payload() {
        let json = r#"{
            "longitude": 4.774186840897145,
            "latitude": 51.59384817617493,
            "sensorId": "5c7c3bbd80e8ae3154d04912",
            "secret": "s3cr3t",
            "data": {"x": {"value": 3.73, "unit": "m/s2"}}
        }"#;

        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.sensor_id.to_string(), "5c7c3bbd80e8ae3154d04912");
        assert_eq!(m.secret, "s3cr3t");
        assert!(m.longitude.is_some());
        assert!(m.data.get("x").is_some());
    }

    #[test]
    fn test_measurement_serialization_omits_secret() {
        let m = Measurement {
            sensor_id: "5c7c3bbd80e8ae3154d04912".parse().unwrap(),
            secret: "s3cr3t".to_string(),
            longitude: None,
            latitude: None,
            timestamp: None,
            data: serde_json::json!({"temp": 21.5}),
        };

        let out = serde_json::to_string(&m).unwrap();
        assert!(!out.contains("s3cr3t"));
        assert!(out.contains("sensorId"));
        assert!(out.contains("temp"));
    }

    #[test]
    fn test_measurement_without_data_field() {
        let json = r#"{"sensorId": "5c7c3bbd80e8ae3154d04912", "secret": "x"}"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert!(m.data.is_null());
    }
}
