use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::NodeWaitError;

/// Queue of "node created" confirmations from the host.
///
/// Creating a node is asynchronous on the host side, so startup parks here
/// until the confirmation for its address shows up.
#[derive(Debug, Default)]
pub struct NodeReadyQueue {
    pending: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl NodeReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_added(&self, address: impl Into<String>) {
        let address = address.into();
        debug!("Host confirmed node {address}");
        self.pending.lock().await.push_back(address);
        // notify_one keeps a permit when nobody is waiting yet
        self.notify.notify_one();
    }

    /// Waits until a confirmation for `address` is queued and consumes it.
    /// Confirmations for other addresses stay in the queue.
    pub async fn wait_for(&self, address: &str) {
        loop {
            if self.take(address).await {
                return;
            }
            self.notify.notified().await;
        }
    }

    pub async fn wait_for_timeout(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<(), NodeWaitError> {
        tokio::time::timeout(timeout, self.wait_for(address))
            .await
            .map_err(|_| NodeWaitError::Timeout {
                address: address.to_string(),
                timeout,
            })
    }

    async fn take(&self, address: &str) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.iter().position(|a| a == address) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}
