//! Remote elevation lookups.
//!
//! [`ElevationSource`] is the seam between the acquisition pipeline and the
//! network. [`EpqsClient`] implements it against the USGS Elevation Point
//! Query Service, which answers `GET ?x={lon}&y={lat}&units=Meters` with a
//! JSON body whose `value` field holds the elevation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::{ElevationError, Result};

/// Public USGS EPQS endpoint.
pub const DEFAULT_EPQS_URL: &str = "https://epqs.nationalmap.gov/v1/json";

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause before each request.
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

/// A service answering single-point elevation queries.
#[async_trait]
pub trait ElevationSource: Send + Sync {
    /// Elevation in meters at `(lat, lon)`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::FetchFailed`] for any transport, status or
    /// payload problem. All such failures are retryable.
    async fn fetch(&self, lat: f64, lon: f64) -> Result<f64>;
}

#[async_trait]
impl<T: ElevationSource + ?Sized> ElevationSource for Arc<T> {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<f64> {
        (**self).fetch(lat, lon).await
    }
}

/// Settings for [`EpqsClient`].
#[derive(Debug, Clone)]
pub struct EpqsConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub pacing: Duration,
}

impl Default for EpqsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EPQS_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            pacing: DEFAULT_PACING,
        }
    }
}

/// HTTP client for the Elevation Point Query Service.
pub struct EpqsClient {
    client: Client,
    config: EpqsConfig,
}

impl EpqsClient {
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidArgument`] if the HTTP client cannot
    /// be constructed.
    pub fn new(config: EpqsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ElevationError::InvalidArgument(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EpqsConfig {
        &self.config
    }
}

#[async_trait]
impl ElevationSource for EpqsClient {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<f64> {
        let failed = |reason: String| ElevationError::FetchFailed { lat, lon, reason };

        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("x", lon.to_string()),
                ("y", lat.to_string()),
                ("units", "Meters".to_string()),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(failed(format!("HTTP status {status}")));
        }

        let body: Value = response.json().await.map_err(|e| failed(e.to_string()))?;
        parse_value(&body).ok_or_else(|| failed(format!("no numeric value in response: {body}")))
    }
}

/// Extract the elevation from an EPQS response body.
///
/// `value` may be a JSON number or a numeric string. Anything else, including
/// a missing field, `null` or a non-finite number, yields `None`.
pub fn parse_value(body: &Value) -> Option<f64> {
    let value = match body.get("value")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}
