//! Task wiring: the radio receive loop, the eviction sweep and the
//! shutdown signal.
//!
//! Exactly one blocking task owns the active transport; everything else
//! communicates through the registry and its event queues. All loops
//! observe a shared shutdown signal, and closing the registry's queues
//! lets sinks drain and exit instead of blocking forever.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::decode::ReportDecoder;
use crate::fanout::EventStream;
use crate::metrics::GatewayMetrics;
use crate::radio::{open_transport, TransportError, FIFO_CAPACITY};
use crate::registry::DeviceRegistry;

/// How long one blocking receive waits before re-checking shutdown.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport re-acquisition backoff bounds.
const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<DeviceRegistry>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new(config.liveness_period()));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            registry,
            metrics: Arc::new(GatewayMetrics::new()),
            shutdown_tx,
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Register a downstream sink before starting the gateway.
    pub fn add_listener(&self, label: &str) -> EventStream {
        self.registry
            .add_listener(label, self.config.event_queue_capacity)
    }

    /// Flip the shared shutdown signal. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A receiver on the shutdown signal for externally run sink loops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn the receive loop and the eviction sweep. The returned
    /// handles complete once [`Gateway::shutdown`] is called.
    pub fn start(&self, decoder: Arc<dyn ReportDecoder>) -> Vec<JoinHandle<()>> {
        let receive = {
            let config = self.config.clone();
            let registry = Arc::clone(&self.registry);
            let metrics = Arc::clone(&self.metrics);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::task::spawn_blocking(move || {
                run_receive_loop(&config, decoder.as_ref(), &registry, &metrics, shutdown);
            })
        };

        let eviction = {
            let registry = Arc::clone(&self.registry);
            let metrics = Arc::clone(&self.metrics);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(run_eviction_sweep(registry, metrics, shutdown))
        };

        vec![receive, eviction]
    }
}

/// Blocking loop that owns the transport: receive, decode, filter by
/// network, fold into the registry. Transport I/O failures trigger
/// re-acquisition with capped exponential backoff.
fn run_receive_loop(
    config: &GatewayConfig,
    decoder: &dyn ReportDecoder,
    registry: &DeviceRegistry,
    metrics: &GatewayMetrics,
    shutdown: watch::Receiver<bool>,
) {
    let mut backoff = BACKOFF_INITIAL;

    'acquire: while !*shutdown.borrow() {
        let mut transport = match open_transport(&config.transport) {
            Ok(t) => {
                info!("radio transport ready");
                t
            }
            Err(e) => {
                metrics.record_transport_error();
                error!("cannot open radio transport: {e}; retrying in {backoff:?}");
                interruptible_sleep(backoff, &shutdown);
                backoff = (backoff * 2).min(BACKOFF_MAX);
                continue;
            }
        };
        backoff = BACKOFF_INITIAL;

        let mut buf = [0u8; FIFO_CAPACITY];
        while !*shutdown.borrow() {
            match transport.recv_timeout(RECV_TIMEOUT, &mut buf) {
                Ok(Some(n)) => {
                    metrics.record_frame();
                    ingest_frame(&buf[..n], config.network_id, decoder, registry, metrics);
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    if matches!(e, TransportError::Crc) {
                        metrics.record_crc_error();
                        warn!("frame dropped: {e}");
                    }
                }
                Err(e) => {
                    metrics.record_transport_error();
                    error!("radio transport failed: {e}; re-acquiring");
                    let _ = transport.close();
                    continue 'acquire;
                }
            }
        }

        if let Err(e) = transport.close() {
            warn!("error closing radio transport: {e}");
        }
        return;
    }
}

fn ingest_frame(
    frame: &[u8],
    network_id: u16,
    decoder: &dyn ReportDecoder,
    registry: &DeviceRegistry,
    metrics: &GatewayMetrics,
) {
    let Some(report) = decoder.decode(frame) else {
        metrics.record_unrecognized();
        return;
    };

    if report.network_id != network_id {
        metrics.record_foreign_network();
        return;
    }

    registry.on_message(report.device_id, report.alerts, &report.readings);
    metrics.record_event_published();
}

/// Periodic staleness sweep at the liveness period.
async fn run_eviction_sweep(
    registry: Arc<DeviceRegistry>,
    metrics: Arc<GatewayMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(registry.liveness_period());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = registry.sweep_stale();
                if evicted > 0 {
                    metrics.record_evictions(evicted as u64);
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

fn interruptible_sleep(total: Duration, shutdown: &watch::Receiver<bool>) {
    let step = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO && !*shutdown.borrow() {
        thread::sleep(step.min(remaining));
        remaining = remaining.saturating_sub(step);
    }
}
