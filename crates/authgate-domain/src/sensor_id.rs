use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Fixed-width 12-byte sensor identifier.
///
/// Rendered as a 24-character lowercase hex string on the wire and in
/// storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId([u8; 12]);

impl SensorId {
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl FromStr for SensorId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 12];
        if s.len() != 24 {
            return Err(DomainError::InvalidSensorId(s.to_string()));
        }
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| DomainError::InvalidSensorId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for SensorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SensorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::custom(format!("expected a 24-character hex sensor id, got {s:?}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_hex() {
        let id: SensorId = "5c7c3bbd80e8ae3154d04912".parse().unwrap();
        assert_eq!(id.to_string(), "5c7c3bbd80e8ae3154d04912");
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(matches!(
            "5c7c3bbd".parse::<SensorId>(),
            Err(DomainError::InvalidSensorId(_))
        ));
    }

    #[test]
    fn test_rejects_non_hex() {
        assert!("zzzzzzzzzzzzzzzzzzzzzzzz".parse::<SensorId>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let id: SensorId = "5c7c3bbd80e8ae3154d04912".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"5c7c3bbd80e8ae3154d04912\"");

        let back: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
