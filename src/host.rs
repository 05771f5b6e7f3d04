//! Collaborator interfaces towards the host platform and the meter endpoint.
//!
//! The node server core only talks to the outside world through these traits, so
//! the host runtime can be swapped for the standalone runner or a test double.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use crate::error::HostError;

/// Driver slots exposed by the meter node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCode {
    Status,
    Gpv,
    /// Instantaneous demand in kW
    Cc,
    /// Instantaneous demand in W
    Gv1,
    /// Energy delivered today in kWh
    Tpw,
    /// Energy delivered yesterday in kWh
    Gv2,
    /// Lifetime energy delivered in kWh
    Gv3,
}

impl DriverCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverCode::Status => "ST",
            DriverCode::Gpv => "GPV",
            DriverCode::Cc => "CC",
            DriverCode::Gv1 => "GV1",
            DriverCode::Tpw => "TPW",
            DriverCode::Gv2 => "GV2",
            DriverCode::Gv3 => "GV3",
        }
    }

    /// Unit of measure id the host renders the value with
    pub fn uom(&self) -> u16 {
        match self {
            DriverCode::Status | DriverCode::Gpv => 2,
            DriverCode::Cc => 30,
            DriverCode::Gv1 => 73,
            DriverCode::Tpw | DriverCode::Gv2 | DriverCode::Gv3 => 33,
        }
    }
}

impl fmt::Display for DriverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverSpec {
    pub code: DriverCode,
    pub initial: f64,
}

/// Everything the host needs to create a device record
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefinition {
    pub address: String,
    pub name: String,
    pub node_def_id: String,
    pub drivers: Vec<DriverSpec>,
}

pub const METER_NODE_ADDRESS: &str = "ami_meter";
pub const METER_NODE_NAME: &str = "AMI Energy Meter";
pub const METER_NODE_DEF_ID: &str = "aminemnode";

impl NodeDefinition {
    /// The single meter node this server publishes to
    pub fn meter() -> Self {
        let driver = |code, initial| DriverSpec { code, initial };
        Self {
            address: METER_NODE_ADDRESS.to_string(),
            name: METER_NODE_NAME.to_string(),
            node_def_id: METER_NODE_DEF_ID.to_string(),
            drivers: vec![
                driver(DriverCode::Status, 1.0),
                driver(DriverCode::Gpv, 0.0),
                driver(DriverCode::Cc, 0.0),
                driver(DriverCode::Gv1, 0.0),
                driver(DriverCode::Tpw, 0.0),
                driver(DriverCode::Gv2, 0.0),
                driver(DriverCode::Gv3, 0.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    ShortPoll,
    LongPoll,
}

/// Lifecycle events delivered by the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    CustomParams(HashMap<String, String>),
    AddNodeDone { address: String },
    Poll(PollKind),
    Command { address: String, command: String },
    Stop,
}

/// Source of the raw meter document. `None` means nothing usable came back.
pub trait MeterSource {
    fn fetch(&self) -> impl Future<Output = Option<String>> + Send;
}

/// Node updates the server pushes into the host
pub trait NodeHost {
    /// Asks the host to create a record. Completion is signalled later through
    /// [`HostEvent::AddNodeDone`].
    fn create_record(&self, node: &NodeDefinition) -> Result<(), HostError>;

    fn update_driver(&self, address: &str, code: DriverCode, value: f64) -> Result<(), HostError>;

    fn set_status(&self, address: &str, status: u8) -> Result<(), HostError>;

    /// Addresses of every record the host currently knows about
    fn record_addresses(&self) -> Vec<String>;
}
