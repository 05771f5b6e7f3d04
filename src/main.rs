use std::sync::Arc;

use ami_meter_nodeserver::{
    standalone, HostEvent, MeterClient, NodeServer, NodeServerConfig, Settings, StandaloneHost,
};
use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EVENT_QUEUE_DEPTH: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting AMI energy meter node server");
    let settings = Settings::from_env()?;
    let meter = MeterClient::new(&settings.gateway).context("Can't build meter HTTP client")?;
    info!("Reading meter from {}", meter.endpoint_url());

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let host = Arc::new(StandaloneHost::new(event_tx.clone()));
    let server = NodeServer::new(
        meter,
        host,
        NodeServerConfig {
            node_ready_timeout: settings.node_ready_timeout,
        },
    );

    event_tx
        .send(HostEvent::CustomParams(settings.custom_params.clone()))
        .await?;
    standalone::spawn_poll_timers(event_tx.clone(), settings.short_poll, settings.long_poll);
    standalone::spawn_stop_on_ctrl_c(event_tx);

    server
        .run(event_rx)
        .await
        .context("Node server stopped with an error")?;
    info!("Node server stopped");
    Ok(())
}
