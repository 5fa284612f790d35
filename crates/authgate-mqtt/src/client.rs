use std::time::Duration;

use authgate_domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, EventLoop, MqttOptions};

/// Connection settings for the MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Capacity of the rumqttc request channel between client handles and
    /// the event loop.
    pub channel_capacity: usize,
}

/// Build the client handle / event loop pair for the configured broker.
/// The connection itself is established lazily by polling the event loop.
pub fn connect(settings: &MqttSettings) -> DomainResult<(AsyncClient, EventLoop)> {
    let (host, port) = parse_broker_url(&settings.broker_url)?;

    let mut options = MqttOptions::new(&settings.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_clean_session(true);

    Ok(AsyncClient::new(options, settings.channel_capacity))
}

/// Parse a broker URL in the form mqtt://host:port, tcp://host:port or
/// host:port (default MQTT port when omitted).
pub(crate) fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.len() {
        1 => Ok((parts[0], 1883)),
        2 => {
            let port = parts[1].parse::<u16>().map_err(|_| {
                DomainError::TransportError(format!("invalid port in broker URL: {}", parts[1]))
            })?;
            Ok((parts[0], port))
        }
        _ => Err(DomainError::TransportError(format!(
            "invalid broker URL format: {url}"
        ))),
    }
}
