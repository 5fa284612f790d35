use std::sync::Arc;
use std::time::Duration;

use authgate_domain::{Command, CommandConsumer, MessageService};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Topics the ingress loop listens on.
#[derive(Debug, Clone)]
pub struct IngressTopics {
    pub measurement_topic: String,
    pub command_topic: String,
}

/// Drive the MQTT event loop: feed measurement payloads into the message
/// service and command payloads into the command consumer.
///
/// Subscriptions are (re)issued on every ConnAck, so a broker reconnect
/// resumes delivery without outside help. Event-loop errors trigger a short
/// delay and another poll; rumqttc re-establishes the connection underneath.
#[instrument(name = "mqtt_ingress", skip_all)]
pub async fn run_ingress(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: IngressTopics,
    service: Arc<MessageService>,
    commands: Arc<CommandConsumer>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        measurement_topic = %topics.measurement_topic,
        command_topic = %topics.command_topic,
        "starting MQTT ingress"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        subscribe(&client, &topics).await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_publish(&topics, &publish.topic, &publish.payload, &service, &commands)
                            .await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT event loop error, reconnecting");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    info!("MQTT ingress stopped");
    Ok(())
}

async fn subscribe(client: &AsyncClient, topics: &IngressTopics) {
    for topic in [&topics.measurement_topic, &topics.command_topic] {
        if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
            error!(topic = %topic, error = %e, "failed to subscribe");
        } else {
            info!(topic = %topic, "subscribed");
        }
    }
}

/// Route one inbound publish to the data path or the control plane.
pub(crate) async fn handle_publish(
    topics: &IngressTopics,
    topic: &str,
    payload: &[u8],
    service: &Arc<MessageService>,
    commands: &Arc<CommandConsumer>,
) {
    if topic == topics.command_topic {
        match Command::decode(payload) {
            Ok(command) => commands.dispatch(&command).await,
            Err(e) => warn!(error = %e, "dropping malformed command payload"),
        }
        return;
    }

    if topic == topics.measurement_topic {
        let raw = String::from_utf8_lossy(payload).into_owned();
        if let Err(e) = service.add_measurement(raw).await {
            error!(error = %e, "failed to enqueue measurement");
        }
        return;
    }

    debug!(topic = %topic, "ignoring message on unexpected topic");
}
