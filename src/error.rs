use std::time::Duration;

use thiserror::Error;

/// Reasons a meter document could not be turned into a reading
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed xml: {0}")]
    Structure(String),
    #[error("tag <{tag}> holds non-numeric value '{value}'")]
    InvalidValue { tag: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum NodeWaitError {
    #[error("node {address} was not confirmed by the host within {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// Failure reported by the host while handling a node update
#[derive(Debug, Error)]
#[error("host rejected {operation} for node {address}: {reason}")]
pub struct HostError {
    pub operation: &'static str,
    pub address: String,
    pub reason: String,
}

impl HostError {
    pub fn new(operation: &'static str, address: &str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that stop the node server
#[derive(Debug, Error)]
pub enum NodeServerError {
    #[error("failed to create node: {0}")]
    CreateNode(#[source] HostError),
    #[error(transparent)]
    NodeWait(#[from] NodeWaitError),
    #[error("failed to shut down cleanly: {0}")]
    Shutdown(#[source] HostError),
}
