use std::sync::Arc;

use clap::{App, Arg};
use tokio::sync::watch;
use tracing::{info, warn};

use fieldgate::config::{GatewayConfig, TransportConfig, DEFAULT_CONFIG_PATH};
use fieldgate::decode::EnvReportDecoder;
use fieldgate::fanout::EventStream;
use fieldgate::gateway::Gateway;
use fieldgate::registry::DeviceRegistry;
use fieldgate::ChangeFlags;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("fieldgate")
        .version("0.1.0")
        .about("LoRa field-sensor gateway")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("PATH")
                .help("Gateway configuration file")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::with_name("simulated")
                .long("simulated")
                .help("Force the simulated loopback transport"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = GatewayConfig::load(config_path)?;
    if matches.is_present("simulated") {
        config.transport = TransportConfig::Simulated;
    }

    info!(
        network_id = config.network_id,
        liveness_secs = config.liveness_period_secs,
        "starting gateway"
    );

    let gateway = Gateway::new(config);
    let registry = gateway.registry();
    let metrics = gateway.metrics();

    let events = gateway.add_listener("log");
    let sink = tokio::spawn(run_logging_sink(
        events,
        Arc::clone(&registry),
        gateway.shutdown_signal(),
    ));

    let tasks = gateway.start(Arc::new(EnvReportDecoder));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    gateway.shutdown();

    for task in tasks {
        if let Err(e) = task.await {
            warn!("gateway task ended abnormally: {e}");
        }
    }
    let _ = sink.await;

    let snapshot = metrics.snapshot();
    info!(
        frames = snapshot.frames_received,
        crc_errors = snapshot.crc_errors,
        evicted = snapshot.devices_evicted,
        "gateway stopped"
    );

    Ok(())
}

/// Built-in sink: logs every change event with the device's scaled
/// readings. Stands in for the external dashboard/automation consumers
/// and exercises the same queue contract they use.
async fn run_logging_sink(
    mut events: EventStream,
    registry: Arc<DeviceRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };

                if event.changes.contains(ChangeFlags::GONE) {
                    info!("device {:#06x} gone", event.device_id);
                    continue;
                }

                let Some(device) = registry.get_device(event.device_id) else {
                    continue;
                };

                let mut readings: Vec<String> = device
                    .readings
                    .iter()
                    .map(|(sensor, &raw)| {
                        let md = sensor.metadata();
                        format!("{}={:.2}{}", md.name, sensor.scale(raw), md.unit)
                    })
                    .collect();
                readings.sort();

                info!(
                    new = event.changes.contains(ChangeFlags::NEW),
                    alerts = device.alerts,
                    "device {:#06x}: {}",
                    event.device_id,
                    readings.join(" ")
                );
            }
            _ = shutdown.changed() => break,
        }
    }
}
