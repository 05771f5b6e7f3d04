use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::host::{DriverCode, MeterSource, NodeHost, PollKind};
use crate::parameters::ParameterStore;
use crate::reading_parser;
use crate::scaled_mapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Parsing,
    Publishing,
}

/// What a single poll cycle ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of driver values the host accepted
    Published(usize),
    NoResponse,
    ParseFailed,
}

/// Runs fetch, parse, scale and publish for one node on every short poll.
/// Cycles never overlap; the caller serializes poll ticks.
pub struct PollDriver<M, H> {
    meter: M,
    host: Arc<H>,
    params: Arc<ParameterStore>,
    address: String,
    state: PollState,
}

impl<M: MeterSource, H: NodeHost> PollDriver<M, H> {
    pub fn new(
        meter: M,
        host: Arc<H>,
        params: Arc<ParameterStore>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            meter,
            host,
            params,
            address: address.into(),
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Handles a poll tick. Only short polls do any work.
    pub async fn on_poll(&mut self, kind: PollKind) -> Option<PollOutcome> {
        match kind {
            PollKind::ShortPoll => Some(self.run_cycle().await),
            PollKind::LongPoll => {
                debug!("Long poll, nothing to do");
                None
            }
        }
    }

    pub async fn run_cycle(&mut self) -> PollOutcome {
        self.transition(PollState::Fetching);
        // No body means the meter or gateway is unreachable, the host keeps the old values
        let Some(body) = self.meter.fetch().await else {
            warn!("No response from meter, keeping previous values");
            self.transition(PollState::Idle);
            return PollOutcome::NoResponse;
        };

        self.transition(PollState::Parsing);
        let reading = match reading_parser::parse(&body) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Couldn't parse meter response: {e}");
                self.transition(PollState::Idle);
                return PollOutcome::ParseFailed;
            }
        };

        info!("Meter reading {}", reading.to_json());

        self.transition(PollState::Publishing);
        // Re-read every cycle so a parameter change applies on the next tick
        let multiplier = self.params.multiplier().await;
        let mut published = 0;
        for update in scaled_mapper::map(&reading, multiplier) {
            info!("{}: {} {}", update.code, update.value, unit_label(update.code));
            // One rejected driver shouldn't hold back the others
            match self
                .host
                .update_driver(&self.address, update.code, update.value)
            {
                Ok(()) => published += 1,
                Err(e) => warn!("Failed to publish {}: {e}", update.code),
            }
        }

        self.transition(PollState::Idle);
        PollOutcome::Published(published)
    }

    fn transition(&mut self, next: PollState) {
        debug!("Poll state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn unit_label(code: DriverCode) -> &'static str {
    match code {
        DriverCode::Cc => "kW",
        DriverCode::Gv1 => "W",
        DriverCode::Tpw | DriverCode::Gv2 | DriverCode::Gv3 => "kWh",
        DriverCode::Status | DriverCode::Gpv => "",
    }
}
