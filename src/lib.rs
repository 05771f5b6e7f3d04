//! AMI Energy Meter Node Server Library
//!
//! Polls a smart meter's `/rest/emeter` XML document through the home-automation
//! gateway and republishes demand and delivered energy as driver values on a
//! single host node.

pub mod error;
pub mod host;
pub mod meter_client;
pub mod node_server;
pub mod node_waiter;
pub mod parameters;
pub mod poll_driver;
pub mod reading_parser;
pub mod scaled_mapper;
pub mod settings;
pub mod standalone;

// Re-export commonly used types for easier access
pub use error::{HostError, NodeServerError, ParseError};
pub use host::{DriverCode, HostEvent, MeterSource, NodeDefinition, NodeHost, PollKind};
pub use meter_client::MeterClient;
pub use node_server::{NodeServer, NodeServerConfig};
pub use poll_driver::{PollDriver, PollOutcome};
pub use reading_parser::Reading;
pub use settings::Settings;
pub use standalone::StandaloneHost;
