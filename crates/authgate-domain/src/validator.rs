use crate::models::{ApiKey, ApiKeyKind, Decision, Measurement, RejectReason, Sensor, User};

/// Pure accept/reject policy for a measurement and its resolved credential
/// triplet. No I/O; the first failing check wins.
#[derive(Debug, Default)]
pub struct MeasurementValidator;

impl MeasurementValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        measurement: &Measurement,
        sensor: Option<&Sensor>,
        user: Option<&User>,
        key: Option<&ApiKey>,
    ) -> Decision {
        // The sensor must be known and the claimed secret must match its
        // stored secret exactly.
        match sensor {
            Some(sensor) if sensor.secret == measurement.secret => {}
            _ => return Decision::Rejected(RejectReason::InvalidSecret),
        }

        // A sensor with no resolvable owner is never implicitly accepted.
        let user = match user {
            Some(user) => user,
            None => return Decision::Rejected(RejectReason::UnknownOwner),
        };
        if user.banned {
            return Decision::Rejected(RejectReason::UserBanned);
        }
        if user.lockout {
            return Decision::Rejected(RejectReason::UserLockedOut);
        }

        // The credential must resolve to a live sensor key. A missing key or
        // a key of the wrong kind is treated the same as a revoked one.
        let key = match key {
            Some(key) if key.kind == ApiKeyKind::Sensor && !key.revoked => key,
            _ => return Decision::Rejected(RejectReason::KeyRevoked),
        };
        if key.user_id != user.id {
            return Decision::Rejected(RejectReason::KeyOwnershipMismatch);
        }
        if key.read_only {
            return Decision::Rejected(RejectReason::KeyReadOnly);
        }

        Decision::Accepted
    }
}
