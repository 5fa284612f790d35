use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::message_service::MessageService;
use crate::sensor_id::SensorId;

pub const FLUSH_SENSOR: &str = "flush_sensor";
pub const FLUSH_USER: &str = "flush_user";
pub const FLUSH_KEY: &str = "flush_key";

/// Out-of-band control instruction: a name routed to exactly one registered
/// handler, plus an opaque argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Command {
    #[serde(rename = "cmd")]
    pub name: String,
    #[serde(rename = "arg", default)]
    pub argument: String,
}

impl Command {
    pub fn decode(payload: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(payload).map_err(|e| DomainError::MalformedCommand(e.to_string()))
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, command: &Command) -> DomainResult<()>;
}

/// Routes commands to handlers registered by name at startup.
///
/// Handler failures are logged and swallowed; the control plane never
/// propagates into the measurement path. Unroutable commands are dropped
/// with a warning.
#[derive(Default)]
pub struct CommandConsumer {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub async fn dispatch(&self, command: &Command) {
        match self.handlers.get(&command.name) {
            Some(handler) => {
                if let Err(e) = handler.execute(command).await {
                    error!(command = %command.name, error = %e, "command handler failed");
                }
            }
            None => {
                warn!(command = %command.name, "no handler registered, dropping command");
            }
        }
    }
}

/// Evicts one sensor from the cache; the next lookup for that id misses and
/// re-resolves from the repository.
pub struct FlushSensorCommandHandler {
    service: Arc<MessageService>,
}

impl FlushSensorCommandHandler {
    pub fn new(service: Arc<MessageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for FlushSensorCommandHandler {
    async fn execute(&self, command: &Command) -> DomainResult<()> {
        let id: SensorId = command.argument.parse()?;
        let removed = self.service.flush_sensor(&id);
        info!(sensor_id = %id, removed, "flushed sensor cache entry");
        Ok(())
    }
}

pub struct FlushUserCommandHandler {
    service: Arc<MessageService>,
}

impl FlushUserCommandHandler {
    pub fn new(service: Arc<MessageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for FlushUserCommandHandler {
    async fn execute(&self, command: &Command) -> DomainResult<()> {
        let id = Uuid::parse_str(&command.argument)
            .map_err(|_| DomainError::InvalidUserId(command.argument.clone()))?;
        let removed = self.service.flush_user(&id);
        info!(user_id = %id, removed, "flushed user cache entry");
        Ok(())
    }
}

pub struct FlushKeyCommandHandler {
    service: Arc<MessageService>,
}

impl FlushKeyCommandHandler {
    pub fn new(service: Arc<MessageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for FlushKeyCommandHandler {
    async fn execute(&self, command: &Command) -> DomainResult<()> {
        let removed = self.service.flush_key(&command.argument);
        info!(removed, "flushed api key cache entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_service::MessageServiceConfig;
    use crate::models::{Sensor, User};
    use crate::repository::{
        MockApiKeyRepository, MockMeasurementProducer, MockSensorRepository, MockUserRepository,
    };
    use std::time::Instant;

    fn empty_service() -> Arc<MessageService> {
        Arc::new(MessageService::new(
            Arc::new(MockSensorRepository::new()),
            Arc::new(MockUserRepository::new()),
            Arc::new(MockApiKeyRepository::new()),
            Arc::new(MockMeasurementProducer::new()),
            MessageServiceConfig::default(),
        ))
    }

    #[test]
    fn test_command_decodes_from_json() {
        let cmd = Command::decode(br#"{"cmd": "flush_sensor", "arg": "abc"}"#).unwrap();
        assert_eq!(cmd.name, "flush_sensor");
        assert_eq!(cmd.argument, "abc");
    }

    #[test]
    fn test_command_argument_defaults_to_empty() {
        let cmd = Command::decode(br#"{"cmd": "reload"}"#).unwrap();
        assert_eq!(cmd.argument, "");
    }

    #[test]
    fn test_command_decode_rejects_garbage() {
        assert!(matches!(
            Command::decode(b"not json"),
            Err(DomainError::MalformedCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_command_is_dropped() {
        let consumer = CommandConsumer::new();
        // Nothing to assert beyond "does not panic or error".
        consumer
            .dispatch(&Command {
                name: "unknown".to_string(),
                argument: String::new(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_handler_error_is_swallowed() {
        let mut handler = MockCommandHandler::new();
        handler
            .expect_execute()
            .times(1)
            .returning(|_| Err(DomainError::InvalidSensorId("bad".to_string())));

        let mut consumer = CommandConsumer::new();
        consumer.register("boom", Arc::new(handler));

        consumer
            .dispatch(&Command {
                name: "boom".to_string(),
                argument: "bad".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_flush_sensor_evicts_cache_entry() {
        let service = empty_service();
        let sensor = Sensor {
            id: "5c7c3bbd80e8ae3154d04912".parse().unwrap(),
            owner: Uuid::new_v4(),
            secret: "abc".to_string(),
        };
        service
            .cache()
            .append_sensors(vec![sensor.clone()], Instant::now());
        assert!(service.cache().contains_sensor(&sensor.id));

        let mut consumer = CommandConsumer::new();
        consumer.register(
            FLUSH_SENSOR,
            Arc::new(FlushSensorCommandHandler::new(Arc::clone(&service))),
        );

        consumer
            .dispatch(&Command {
                name: FLUSH_SENSOR.to_string(),
                argument: sensor.id.to_string(),
            })
            .await;

        assert!(!service.cache().contains_sensor(&sensor.id));
    }

    #[tokio::test]
    async fn test_flush_user_evicts_cache_entry() {
        let service = empty_service();
        let user = User {
            id: Uuid::new_v4(),
            lockout: false,
            banned: false,
        };
        service.cache().append_users(vec![user], Instant::now());

        let handler = FlushUserCommandHandler::new(Arc::clone(&service));
        handler
            .execute(&Command {
                name: FLUSH_USER.to_string(),
                argument: user.id.to_string(),
            })
            .await
            .unwrap();

        assert!(!service.cache().contains_user(&user.id));
    }

    #[tokio::test]
    async fn test_flush_sensor_with_bad_argument_errors() {
        let service = empty_service();
        let handler = FlushSensorCommandHandler::new(service);

        let result = handler
            .execute(&Command {
                name: FLUSH_SENSOR.to_string(),
                argument: "not-a-sensor-id".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::InvalidSensorId(_))));
    }
}
