pub mod client;
pub mod ingress;
pub mod producer;

pub use client::{connect, MqttSettings};
pub use ingress::{run_ingress, IngressTopics};
pub use producer::MqttMeasurementProducer;
