use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Scale factor used when the user hasn't configured a usable one
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

pub const MULTIPLIER_KEY: &str = "multiplier";

/// Holds the custom parameters last delivered by the host
#[derive(Debug, Default)]
pub struct ParameterStore {
    params: RwLock<HashMap<String, String>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored parameters with a fresh set from the host
    pub async fn load(&self, params: HashMap<String, String>) {
        info!("Custom parameters updated: {params:?}");
        *self.params.write().await = params;
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.params.read().await.get(key).cloned()
    }

    /// Current multiplier, or the default when unset or unusable
    pub async fn multiplier(&self) -> f64 {
        parse_multiplier(self.get(MULTIPLIER_KEY).await.as_deref())
    }
}

fn parse_multiplier(raw: Option<&str>) -> f64 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_MULTIPLIER;
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        Ok(value) => {
            warn!("Multiplier must be positive, got {value}; using {DEFAULT_MULTIPLIER}");
            DEFAULT_MULTIPLIER
        }
        Err(e) => {
            warn!("Multiplier '{raw}' is not a number ({e}); using {DEFAULT_MULTIPLIER}");
            DEFAULT_MULTIPLIER
        }
    }
}

/// Parses a JSON object of custom parameters into string values.
///
/// Hosts are inconsistent about quoting, so numbers and booleans are
/// stringified and `null` becomes an empty value.
pub fn custom_params_from_json(json: &str) -> anyhow::Result<HashMap<String, String>> {
    let raw: HashMap<String, Value> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
