mod api_key_repository;
mod client;
mod models;
mod sensor_repository;
mod user_repository;

pub use api_key_repository::PostgresApiKeyRepository;
pub use client::PostgresClient;
pub use models::{ApiKeyRow, SensorRow, UserRow};
pub use sensor_repository::PostgresSensorRepository;
pub use user_repository::PostgresUserRepository;
