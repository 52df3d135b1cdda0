use crate::core::{GeocodeResponse, Geocoder};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, error, instrument};

/// Geocoder backed by an HTTP API answering
/// `GET {base_url}/geocode?location=...` with a `results` list.
///
/// Each call makes exactly one request; failures are returned to the caller.
pub struct HttpGeocoder {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGeocoder {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("holdmap/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client,
        })
    }

    fn request_url(&self, location: &str) -> Result<Url> {
        let mut params = vec![("location", location)];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }
        Url::parse_with_params(&format!("{}/geocode", self.base_url), &params)
            .with_context(|| format!("Invalid geocoder base URL: {}", self.base_url))
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    #[instrument(
        name = "Geocode",
        skip(self),
        fields(location = %location)
    )]
    async fn geocode(&self, location: &str) -> Result<GeocodeResponse> {
        let url = self.request_url(location)?;
        debug!("Requesting geocode for {}", location);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for location: {}", e, location))?
            .error_for_status()
            .map_err(|e| anyhow!("HTTP error: {} for location: {}", e, location))?;

        let response_text = response
            .text()
            .await
            .context("Failed to get response text")?;

        match serde_json::from_str::<GeocodeResponse>(&response_text) {
            Ok(data) => {
                debug!(results = data.results.len(), "Received geocode response");
                Ok(data)
            }
            Err(e) => {
                error!(
                    error = ?e,
                    response = %response_text,
                    "Failed to parse geocode response"
                );
                Err(e).context("Failed to parse geocode response")
            }
        }
    }
}
