//! Client for the collector API
//!
//! Three calls are made: `GET /ping` and `POST /node` once at startup, then
//! `POST /node/state` for every decoded frame.

use loratail_core::{FrameSink, OutputError, TelemetryFrame};
use reqwest::{Client, Method};
use serde::Serialize;
use tracing::{debug, info};

/// Body of `POST /node/state`
#[derive(Debug, Serialize)]
struct StatePostRequest {
    #[serde(rename = "BarometerState")]
    barometer: BarometerState,
    #[serde(rename = "Power")]
    power: PowerState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BarometerState {
    pressure: f32,
    temperature: f32,
    altitude: f32,
}

#[derive(Debug, Serialize)]
struct PowerState {
    #[serde(rename = "Current_mA")]
    current_ma: f32,
    #[serde(rename = "LoadVoltage")]
    load_voltage: f32,
    #[serde(rename = "Power_mW")]
    power_mw: f32,
}

impl From<&TelemetryFrame> for StatePostRequest {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            barometer: BarometerState {
                pressure: frame.pressure,
                temperature: frame.temperature,
                altitude: frame.altitude,
            },
            power: PowerState {
                current_ma: frame.current_ma,
                load_voltage: frame.load_voltage,
                power_mw: frame.power_mw,
            },
        }
    }
}

/// Issues requests against the collector at a fixed base URL
#[derive(Debug, Clone)]
pub struct CollectorClient {
    client: Client,
    base_url: String,
}

impl CollectorClient {
    /// Client for a collector reachable over HTTPS at `host:port`
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self::with_base_url(client, format!("https://{}", endpoint))
    }

    /// Client for an explicit base URL, scheme included
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connectivity check
    pub async fn ping(&self) -> Result<(), OutputError> {
        self.send(Method::GET, "/ping", None).await
    }

    /// Register this node with the collector
    pub async fn register_node(&self) -> Result<(), OutputError> {
        self.send(Method::POST, "/node", None).await
    }

    /// Post one frame as the node's latest state
    pub async fn post_state(&self, frame: &TelemetryFrame) -> Result<(), OutputError> {
        let body = serde_json::to_vec(&StatePostRequest::from(frame))
            .map_err(|e| OutputError::Serialization(e.to_string()))?;
        self.send(Method::POST, "/node/state", Some(body)).await
    }

    /// Send a request; only transport failures are errors, any status is logged
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<(), OutputError> {
        let endpoint = format!("{}{}", self.base_url, path);
        info!(method = %method, endpoint = %endpoint, "Invoking request");

        let mut request = self.client.request(method, &endpoint);
        if let Some(body) = body {
            request = request.header("Content-Type", "application/json").body(body);
        }

        let response = request.send().await.map_err(|e| OutputError::Delivery {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let content: String = response.text().await.unwrap_or_default();
        info!(status = %status, "Response from collector");
        if !content.is_empty() {
            debug!(body = %content, "Collector response body");
        }
        Ok(())
    }
}

impl FrameSink for CollectorClient {
    fn name(&self) -> &'static str {
        "collector"
    }

    async fn deliver(&mut self, frame: &TelemetryFrame) -> Result<(), OutputError> {
        self.post_state(frame).await
    }
}
