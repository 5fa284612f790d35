pub mod cache;
pub mod command;
pub mod error;
pub mod handler;
pub mod message_service;
pub mod models;
pub mod repository;
pub mod sensor_id;
pub mod validator;

pub use cache::EntityCache;
pub use command::{
    Command, CommandConsumer, CommandHandler, FlushKeyCommandHandler, FlushSensorCommandHandler,
    FlushUserCommandHandler, FLUSH_KEY, FLUSH_SENSOR, FLUSH_USER,
};
pub use error::{DomainError, DomainResult};
pub use handler::{HandlerOutcome, MeasurementHandler};
pub use message_service::{CycleReport, MessageService, MessageServiceConfig};
pub use models::{ApiKey, ApiKeyKind, Decision, Measurement, RejectReason, Sensor, User};
pub use repository::{ApiKeyRepository, MeasurementProducer, SensorRepository, UserRepository};
pub use sensor_id::SensorId;
pub use validator::MeasurementValidator;

#[cfg(any(test, feature = "testing"))]
pub use command::MockCommandHandler;
#[cfg(any(test, feature = "testing"))]
pub use repository::{
    MockApiKeyRepository, MockMeasurementProducer, MockSensorRepository, MockUserRepository,
};
