//! Minimal host used when the node server runs on its own.
//!
//! It keeps the node records in memory, confirms node creation straight away,
//! drives short/long polls from timers and logs every driver change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::HostError;
use crate::host::{DriverCode, HostEvent, NodeDefinition, NodeHost, PollKind};

type DriverValues = HashMap<DriverCode, f64>;

pub struct StandaloneHost {
    events: Sender<HostEvent>,
    records: Mutex<BTreeMap<String, DriverValues>>,
}

impl StandaloneHost {
    pub fn new(events: Sender<HostEvent>) -> Self {
        Self {
            events,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Last value written to a driver, if the record exists
    pub fn driver_value(&self, address: &str, code: DriverCode) -> Option<f64> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.get(address)?.get(&code).copied()
    }

    fn with_record(
        &self,
        operation: &'static str,
        address: &str,
        apply: impl FnOnce(&mut DriverValues),
    ) -> Result<(), HostError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| HostError::new(operation, address, "record table poisoned"))?;
        let record = records
            .get_mut(address)
            .ok_or_else(|| HostError::new(operation, address, "no such node"))?;
        apply(record);
        Ok(())
    }
}

impl NodeHost for StandaloneHost {
    fn create_record(&self, node: &NodeDefinition) -> Result<(), HostError> {
        {
            let mut records = self
                .records
                .lock()
                .map_err(|_| HostError::new("create_record", &node.address, "record table poisoned"))?;
            let drivers = node.drivers.iter().map(|d| (d.code, d.initial)).collect();
            records.insert(node.address.clone(), drivers);
        }
        info!(
            "Node {} '{}' ({}) created",
            node.address, node.name, node.node_def_id
        );
        self.events
            .try_send(HostEvent::AddNodeDone {
                address: node.address.clone(),
            })
            .map_err(|e| HostError::new("create_record", &node.address, e.to_string()))
    }

    fn update_driver(&self, address: &str, code: DriverCode, value: f64) -> Result<(), HostError> {
        self.with_record("update_driver", address, |record| {
            record.insert(code, value);
        })?;
        info!("{address} {code}={value} (uom {})", code.uom());
        Ok(())
    }

    fn set_status(&self, address: &str, status: u8) -> Result<(), HostError> {
        self.with_record("set_status", address, |record| {
            record.insert(DriverCode::Status, f64::from(status));
        })?;
        info!("{address} status={status}");
        Ok(())
    }

    fn record_addresses(&self) -> Vec<String> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.keys().cloned().collect()
    }
}

/// Sends short and long poll ticks until the receiving side goes away
pub fn spawn_poll_timers(events: Sender<HostEvent>, short_poll: Duration, long_poll: Duration) {
    tokio::spawn(async move {
        let mut short = interval(short_poll);
        let mut long = interval(long_poll);
        short.set_missed_tick_behavior(MissedTickBehavior::Skip);
        long.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let kind = tokio::select! {
                _ = short.tick() => PollKind::ShortPoll,
                _ = long.tick() => PollKind::LongPoll,
            };
            if events.send(HostEvent::Poll(kind)).await.is_err() {
                break;
            }
        }
    });
}

/// Turns Ctrl-C into a stop event
pub fn spawn_stop_on_ctrl_c(events: Sender<HostEvent>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Can't listen for Ctrl-C: {e}");
            return;
        }
        info!("Ctrl-C received");
        let _ = events.send(HostEvent::Stop).await;
    });
}
