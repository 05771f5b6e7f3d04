use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::parameters::custom_params_from_json;

const DEFAULT_SHORT_POLL_SECS: u64 = 60;
const DEFAULT_LONG_POLL_SECS: u64 = 600;
const DEFAULT_NODE_READY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Where and how to reach the gateway serving the meter document
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub short_poll: Duration,
    pub long_poll: Duration,
    pub node_ready_timeout: Duration,
    pub custom_params: HashMap<String, String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup, `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let base_url = lookup("ISY_URL")
            .filter(|url| !url.trim().is_empty())
            .context("ISY_URL must point at the gateway, e.g. http://192.168.1.10")?;
        let username = lookup("ISY_USERNAME").filter(|user| !user.is_empty());
        let password = lookup("ISY_PASSWORD").unwrap_or_default();

        let custom_params = match lookup("CUSTOM_PARAMS") {
            Some(json) if !json.trim().is_empty() => {
                custom_params_from_json(&json).context("CUSTOM_PARAMS must be a JSON object")?
            }
            _ => HashMap::new(),
        };

        let settings = Self {
            gateway: GatewaySettings {
                base_url,
                username,
                password,
                request_timeout: secs_or_default(
                    &lookup,
                    "HTTP_TIMEOUT_SECS",
                    DEFAULT_HTTP_TIMEOUT_SECS,
                ),
            },
            short_poll: secs_or_default(&lookup, "SHORT_POLL_SECS", DEFAULT_SHORT_POLL_SECS),
            long_poll: secs_or_default(&lookup, "LONG_POLL_SECS", DEFAULT_LONG_POLL_SECS),
            node_ready_timeout: secs_or_default(
                &lookup,
                "NODE_READY_TIMEOUT_SECS",
                DEFAULT_NODE_READY_TIMEOUT_SECS,
            ),
            custom_params,
        };

        info!("Node server config:");
        info!("  Gateway: {}", settings.gateway.base_url);
        info!(
            "  Auth: {}",
            settings.gateway.username.as_deref().unwrap_or("none")
        );
        info!(
            "  Short poll {:?}, long poll {:?}",
            settings.short_poll, settings.long_poll
        );
        Ok(settings)
    }
}

/// Reads a positive number of seconds, falling back to the default otherwise
fn secs_or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    let secs = match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                warn!("{key}='{raw}' is not a positive number of seconds, using {default}");
                default
            }
        },
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[("ISY_URL", "http://isy")])).unwrap();
        assert_eq!(settings.gateway.base_url, "http://isy");
        assert_eq!(settings.gateway.username, None);
        assert_eq!(settings.gateway.password, "");
        assert_eq!(settings.gateway.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.short_poll, Duration::from_secs(60));
        assert_eq!(settings.long_poll, Duration::from_secs(600));
        assert_eq!(settings.node_ready_timeout, Duration::from_secs(30));
        assert!(settings.custom_params.is_empty());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ISY_URL", "https://10.0.0.2"),
            ("ISY_USERNAME", "admin"),
            ("ISY_PASSWORD", "pw"),
            ("SHORT_POLL_SECS", "15"),
            ("LONG_POLL_SECS", "120"),
            ("NODE_READY_TIMEOUT_SECS", "5"),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("CUSTOM_PARAMS", r#"{"multiplier": "1000"}"#),
        ]))
        .unwrap();
        assert_eq!(settings.gateway.username.as_deref(), Some("admin"));
        assert_eq!(settings.gateway.password, "pw");
        assert_eq!(settings.gateway.request_timeout, Duration::from_secs(3));
        assert_eq!(settings.short_poll, Duration::from_secs(15));
        assert_eq!(settings.long_poll, Duration::from_secs(120));
        assert_eq!(settings.node_ready_timeout, Duration::from_secs(5));
        assert_eq!(settings.custom_params["multiplier"], "1000");
    }

    #[test]
    fn test_missing_gateway_is_an_error() {
        assert!(Settings::from_lookup(lookup_from(&[])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("ISY_URL", " ")])).is_err());
    }

    #[test]
    fn test_invalid_durations_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ISY_URL", "http://isy"),
            ("SHORT_POLL_SECS", "soon"),
            ("LONG_POLL_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(settings.short_poll, Duration::from_secs(60));
        assert_eq!(settings.long_poll, Duration::from_secs(600));
    }

    #[test]
    fn test_bad_custom_params_is_an_error() {
        let result = Settings::from_lookup(lookup_from(&[
            ("ISY_URL", "http://isy"),
            ("CUSTOM_PARAMS", "multiplier=10"),
        ]));
        assert!(result.is_err());
    }
}
