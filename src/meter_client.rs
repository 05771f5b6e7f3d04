use tracing::warn;

use crate::host::MeterSource;
use crate::settings::GatewaySettings;

/// REST path on the gateway that serves the energy meter document
pub const EMETER_PATH: &str = "/rest/emeter";

pub struct MeterClient {
    endpoint_url: String,
    username: Option<String>,
    password: String,
    client: reqwest::Client,
}

impl MeterClient {
    pub fn new(gateway: &GatewaySettings) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(gateway.request_timeout)
            .build()?;
        Ok(Self {
            endpoint_url: format!("{}{}", gateway.base_url.trim_end_matches('/'), EMETER_PATH),
            username: gateway.username.clone(),
            password: gateway.password.clone(),
            client,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    async fn read_document(&self) -> Result<String, anyhow::Error> {
        let mut request = self.client.get(&self.endpoint_url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, Some(&self.password));
        }
        let body = request.send().await?.error_for_status()?.text().await?;
        Ok(body)
    }
}

impl MeterSource for MeterClient {
    async fn fetch(&self) -> Option<String> {
        match self.read_document().await {
            Ok(body) if body.trim().is_empty() => {
                warn!("Meter returned an empty document");
                None
            }
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Didn't read meter at {}: {e}", self.endpoint_url);
                None
            }
        }
    }
}

#[cfg(test)]
mod test_meter_client {
    use super::*;
    use std::time::Duration;

    fn gateway(url: String, username: Option<&str>) -> GatewaySettings {
        GatewaySettings {
            base_url: url,
            username: username.map(str::to_string),
            password: "secret".to_string(),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/rest/emeter")
            .match_header("Authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body("<eMeterData><currSumDelivered>10</currSumDelivered></eMeterData>")
            .create_async()
            .await;

        let client = MeterClient::new(&gateway(format!("{}/", server.url()), Some("admin"))).unwrap();
        assert_eq!(client.endpoint_url(), format!("{}/rest/emeter", server.url()));

        let body = client.fetch().await;
        assert_eq!(
            body.as_deref(),
            Some("<eMeterData><currSumDelivered>10</currSumDelivered></eMeterData>")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_without_credentials_sends_no_auth() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/rest/emeter")
            .match_header("Authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body("<m/>")
            .create_async()
            .await;

        let client = MeterClient::new(&gateway(server.url(), None)).unwrap();
        assert_eq!(client.fetch().await.as_deref(), Some("<m/>"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/emeter")
            .with_status(401)
            .with_body("<RestResponse succeeded=\"false\"/>")
            .create_async()
            .await;

        let client = MeterClient::new(&gateway(server.url(), Some("admin"))).unwrap();
        assert_eq!(client.fetch().await, None);
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/emeter")
            .with_status(200)
            .with_body("  \n")
            .create_async()
            .await;

        let client = MeterClient::new(&gateway(server.url(), None)).unwrap();
        assert_eq!(client.fetch().await, None);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_absent() {
        let client = MeterClient::new(&gateway("http://127.0.0.1:1".to_string(), None)).unwrap();
        assert_eq!(client.fetch().await, None);
    }
}
