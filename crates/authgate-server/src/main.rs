mod config;
mod runner;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use authgate_domain::{
    CommandConsumer, FlushKeyCommandHandler, FlushSensorCommandHandler, FlushUserCommandHandler,
    MessageService, FLUSH_KEY, FLUSH_SENSOR, FLUSH_USER,
};
use authgate_mqtt::{run_ingress, MqttMeasurementProducer};
use authgate_postgres::{
    PostgresApiKeyRepository, PostgresClient, PostgresSensorRepository, PostgresUserRepository,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use config::ServiceConfig;
use runner::Runner;
use telemetry::{TelemetryConfig, TelemetryProviders};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match telemetry::init_telemetry(&TelemetryConfig {
            service_name: config.otel_service_name.clone(),
            otel_endpoint: config.otel_endpoint.clone(),
            otel_enabled: config.otel_enabled,
            log_level: config.log_level.clone(),
        }) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {e}");
                std::process::exit(1);
            }
        };

    info!(
        broker = %config.mqtt_broker_url,
        workers = config.workers,
        batch_size = config.internal_batch_size,
        "starting authgate"
    );
    debug!("Configuration: {:?}", config);

    // Credential repositories
    let postgres = match PostgresClient::new(
        &config.postgres_host,
        config.postgres_port,
        &config.postgres_database,
        &config.postgres_username,
        &config.postgres_password,
        config.postgres_pool_size,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to initialize PostgreSQL client");
            std::process::exit(1);
        }
    };
    if let Err(e) = postgres.ping().await {
        error!(error = %e, "PostgreSQL is not reachable");
        std::process::exit(1);
    }
    let sensors = Arc::new(PostgresSensorRepository::new(postgres.clone()));
    let users = Arc::new(PostgresUserRepository::new(postgres.clone()));
    let keys = Arc::new(PostgresApiKeyRepository::new(postgres));

    // Transport
    let (mqtt_client, eventloop) = match authgate_mqtt::connect(&config.mqtt_settings()) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "invalid MQTT configuration");
            std::process::exit(1);
        }
    };
    let producer = Arc::new(MqttMeasurementProducer::new(
        mqtt_client.clone(),
        config.bulk_measurement_topic.clone(),
    ));

    // Core service
    let service = Arc::new(MessageService::new(
        sensors,
        users,
        keys,
        producer,
        config.message_service_config(),
    ));

    if config.preload_cache {
        if let Err(e) = service.preload().await {
            error!(error = %e, "failed to preload entity cache");
            std::process::exit(1);
        }
    }

    // Control plane
    let mut commands = CommandConsumer::new();
    commands.register(
        FLUSH_SENSOR,
        Arc::new(FlushSensorCommandHandler::new(Arc::clone(&service))),
    );
    commands.register(
        FLUSH_USER,
        Arc::new(FlushUserCommandHandler::new(Arc::clone(&service))),
    );
    commands.register(
        FLUSH_KEY,
        Arc::new(FlushKeyCommandHandler::new(Arc::clone(&service))),
    );
    let commands = Arc::new(commands);

    let topics = config.ingress_topics();
    let poll_interval = config.poll_interval();

    let runner = Runner::new()
        .with_process({
            let service = Arc::clone(&service);
            let commands = Arc::clone(&commands);
            move |token| run_ingress(mqtt_client, eventloop, topics, service, commands, token)
        })
        .with_process({
            let service = Arc::clone(&service);
            move |token| process_loop(service, poll_interval, token)
        })
        .with_closer(move || async move {
            telemetry::shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if let Err(e) = runner.run().await {
        error!(error = %e, "authgate exited with error");
        std::process::exit(1);
    }
    info!("authgate exited");
}

/// Tick scheduler for the message service: one `process` per interval,
/// crediting the previous cycle's duration against the next wait.
async fn process_loop(
    service: Arc<MessageService>,
    interval: Duration,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let mut wait = interval;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let (published, rejected) = service.totals();
                info!(published, rejected, "measurement processing stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let report = service.process().await;
        wait = interval.saturating_sub(report.duration);
    }
}
