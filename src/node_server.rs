use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::NodeServerError;
use crate::host::{HostEvent, MeterSource, NodeDefinition, NodeHost};
use crate::node_waiter::NodeReadyQueue;
use crate::parameters::ParameterStore;
use crate::poll_driver::PollDriver;

const WORK_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct NodeServerConfig {
    /// How long startup waits for the host to confirm the meter node
    pub node_ready_timeout: Duration,
}

impl Default for NodeServerConfig {
    fn default() -> Self {
        Self {
            node_ready_timeout: Duration::from_secs(30),
        }
    }
}

/// Ties the host event stream to the meter poller.
///
/// Parameter updates, node confirmations and stop requests are applied as soon
/// as they arrive. Polls and commands are queued and handled one at a time once
/// the meter node exists.
pub struct NodeServer<M, H> {
    host: Arc<H>,
    params: Arc<ParameterStore>,
    nodes: Arc<NodeReadyQueue>,
    node: NodeDefinition,
    poller: PollDriver<M, H>,
    config: NodeServerConfig,
}

impl<M, H> NodeServer<M, H>
where
    M: MeterSource,
    H: NodeHost,
{
    pub fn new(meter: M, host: Arc<H>, config: NodeServerConfig) -> Self {
        let params = Arc::new(ParameterStore::new());
        let node = NodeDefinition::meter();
        let poller = PollDriver::new(meter, host.clone(), params.clone(), node.address.clone());
        Self {
            host,
            params,
            nodes: Arc::new(NodeReadyQueue::new()),
            node,
            poller,
            config,
        }
    }

    /// Processes host events until a stop is requested or the stream ends
    pub async fn run(mut self, events: Receiver<HostEvent>) -> Result<(), NodeServerError> {
        let (work_tx, mut work_rx) = mpsc::channel(WORK_QUEUE_DEPTH);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch(
            events,
            self.params.clone(),
            self.nodes.clone(),
            work_tx,
            stop_tx,
        ));

        let result = self.serve(&mut work_rx, &mut stop_rx).await;
        dispatcher.abort();
        result
    }

    /// Marks every record the host knows as offline. Each record is visited
    /// once even if an earlier one fails; the first failure is returned.
    pub fn stop(&self) -> Result<(), NodeServerError> {
        info!("Stopping, setting all nodes offline");
        let mut first_error = None;
        for address in self.host.record_addresses() {
            if let Err(e) = self.host.set_status(&address, 0) {
                warn!("Couldn't mark {address} offline: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(NodeServerError::Shutdown(e)),
            None => Ok(()),
        }
    }

    async fn serve(
        &mut self,
        work: &mut Receiver<HostEvent>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), NodeServerError> {
        info!("Creating node {} ({})", self.node.address, self.node.name);
        self.host
            .create_record(&self.node)
            .map_err(NodeServerError::CreateNode)?;

        // From here on the record exists, so every way out marks it offline
        tokio::select! {
            ready = self.nodes.wait_for_timeout(&self.node.address, self.config.node_ready_timeout) => {
                if let Err(e) = ready {
                    if let Err(stop_error) = self.stop() {
                        warn!("Shutdown after failed startup also failed: {stop_error}");
                    }
                    return Err(e.into());
                }
                info!("Node {} is ready", self.node.address);
            }
            _ = stop_requested(stop) => {
                info!("Stop requested before node {} was confirmed", self.node.address);
                return self.stop();
            }
        }

        loop {
            // Work already queued ahead of a stop still runs
            tokio::select! {
                biased;
                event = work.recv() => match event {
                    Some(HostEvent::Poll(kind)) => {
                        if let Some(outcome) = self.poller.on_poll(kind).await {
                            debug!("Poll finished: {outcome:?}");
                        }
                    }
                    Some(HostEvent::Command { address, command }) => on_command(&address, &command),
                    Some(other) => warn!("Unexpected event on work queue: {other:?}"),
                    None => {
                        info!("Host event stream closed");
                        break;
                    }
                },
                _ = stop_requested(stop) => break,
            }
        }

        self.stop()
    }
}

/// Resolves once a stop was requested or the event stream went away
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|requested| *requested).await;
}

async fn dispatch(
    mut events: Receiver<HostEvent>,
    params: Arc<ParameterStore>,
    nodes: Arc<NodeReadyQueue>,
    work: Sender<HostEvent>,
    stop: watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::CustomParams(values) => params.load(values).await,
            HostEvent::AddNodeDone { address } => nodes.node_added(address).await,
            HostEvent::Stop => {
                stop.send_replace(true);
            }
            // Never block here, or a backlog of polls would hide the node confirmation
            other => match work.try_send(other) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    // A poll carries no state, the next tick reads the meter again
                    debug!("Work queue full, dropping {event:?}");
                }
                Err(TrySendError::Closed(_)) => break,
            },
        }
    }
}

fn on_command(address: &str, command: &str) {
    match command {
        "DISCOVER" => info!("Discover not implemented"),
        other => warn!("Unknown command {other} for {address}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{DriverCode, PollKind};
    use std::sync::Mutex;

    struct NoMeter;

    impl MeterSource for NoMeter {
        async fn fetch(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct FakeHost {
        records: Vec<String>,
        fail_on: Option<String>,
        statuses: Mutex<Vec<(String, u8)>>,
    }

    impl FakeHost {
        fn with_records(count: usize) -> Self {
            Self {
                records: (0..count).map(|i| format!("node{i}")).collect(),
                ..Default::default()
            }
        }
    }

    impl NodeHost for FakeHost {
        fn create_record(&self, node: &NodeDefinition) -> Result<(), HostError> {
            Err(HostError::new("create_record", &node.address, "offline"))
        }

        fn update_driver(&self, _: &str, _: DriverCode, _: f64) -> Result<(), HostError> {
            Ok(())
        }

        fn set_status(&self, address: &str, status: u8) -> Result<(), HostError> {
            self.statuses
                .lock()
                .unwrap()
                .push((address.to_string(), status));
            if self.fail_on.as_deref() == Some(address) {
                return Err(HostError::new("set_status", address, "gone"));
            }
            Ok(())
        }

        fn record_addresses(&self) -> Vec<String> {
            self.records.clone()
        }
    }

    fn server(host: FakeHost) -> (NodeServer<NoMeter, FakeHost>, Arc<FakeHost>) {
        let host = Arc::new(host);
        (
            NodeServer::new(NoMeter, host.clone(), NodeServerConfig::default()),
            host,
        )
    }

    #[test]
    fn test_stop_visits_each_record_once() {
        for count in [0, 1, 5] {
            let (server, host) = server(FakeHost::with_records(count));
            server.stop().unwrap();

            let statuses = host.statuses.lock().unwrap();
            assert_eq!(statuses.len(), count);
            for (i, (address, status)) in statuses.iter().enumerate() {
                assert_eq!(address, &format!("node{i}"));
                assert_eq!(*status, 0);
            }
        }
    }

    #[test]
    fn test_stop_continues_after_failure() {
        let mut host = FakeHost::with_records(3);
        host.fail_on = Some("node1".to_string());
        let (server, host) = server(host);

        let result = server.stop();
        assert!(matches!(result, Err(NodeServerError::Shutdown(_))));
        assert_eq!(host.statuses.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let (server, host) = server(FakeHost::default());
        let (_tx, rx) = mpsc::channel(4);
        let result = server.run(rx).await;
        assert!(matches!(result, Err(NodeServerError::CreateNode(_))));
        assert!(host.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_keeps_reading_behind_a_poll_backlog() {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (work_tx, mut work_rx) = mpsc::channel(2);
        let (stop_tx, stop_rx) = watch::channel(false);
        let nodes = Arc::new(NodeReadyQueue::new());

        for _ in 0..10 {
            event_tx
                .send(HostEvent::Poll(PollKind::ShortPoll))
                .await
                .unwrap();
        }
        event_tx
            .send(HostEvent::AddNodeDone {
                address: "ami_meter".to_string(),
            })
            .await
            .unwrap();
        event_tx.send(HostEvent::Stop).await.unwrap();
        drop(event_tx);

        tokio::time::timeout(
            Duration::from_secs(1),
            dispatch(
                event_rx,
                Arc::new(ParameterStore::new()),
                nodes.clone(),
                work_tx,
                stop_tx,
            ),
        )
        .await
        .expect("Dispatch should not block on a full work queue");

        assert_eq!(nodes.pending().await, 1);
        assert!(*stop_rx.borrow());

        // Only what fits in the queue survives, the rest of the ticks are dropped
        let mut queued = 0;
        while work_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 2);
    }
}
