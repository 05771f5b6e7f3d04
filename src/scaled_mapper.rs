use tracing::warn;

use crate::host::DriverCode;
use crate::parameters::DEFAULT_MULTIPLIER;
use crate::reading_parser::Reading;

/// A single value destined for one driver slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverUpdate {
    pub code: DriverCode,
    pub value: f64,
}

/// Scales a reading into the five published driver values.
///
/// A multiplier that cannot be divided by (zero, negative, NaN, infinite) is
/// replaced with the default for this cycle.
pub fn map(reading: &Reading, multiplier: f64) -> [DriverUpdate; 5] {
    let multiplier = usable_multiplier(multiplier);
    let update = |code, value: f64| DriverUpdate {
        code,
        value: value / multiplier,
    };
    [
        update(DriverCode::Cc, reading.instantaneous_demand_kw),
        DriverUpdate {
            code: DriverCode::Gv1,
            value: reading.instantaneous_demand_w / multiplier * 1000.0,
        },
        update(DriverCode::Tpw, reading.current_day_delivered_kwh),
        update(DriverCode::Gv2, reading.previous_day_delivered_kwh),
        update(DriverCode::Gv3, reading.lifetime_delivered_kwh),
    ]
}

fn usable_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier > 0.0 {
        multiplier
    } else {
        warn!(
            "Multiplier {multiplier} can't be used for scaling, using {DEFAULT_MULTIPLIER} for this cycle"
        );
        DEFAULT_MULTIPLIER
    }
}
