//! HTTP client for the activity metrics backend
//!
//! The backend exposes, per access channel (remote-desktop proxy, SSH,
//! web SSH), a last-activity query keyed by instance namespace/name, plus
//! a health endpoint and per-channel availability probes. The reported
//! activity is the maximum across channels.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use warden_api::Instance;

use crate::{ActivityError, ActivityResult, ActivitySource};

/// HTTP-backed activity source
pub struct HttpActivitySource {
    client: Client,
    base_url: String,
    channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LastActivityResponse {
    last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    available: bool,
}

impl HttpActivitySource {
    /// Create a client for the metrics backend at `base_url`, querying the
    /// given access channels.
    pub fn new(
        base_url: impl Into<String>,
        channels: Vec<String>,
        request_timeout: Duration,
    ) -> ActivityResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            channels,
        })
    }

    async fn channel_available(&self, channel: &str) -> bool {
        let url = format!("{}/channels/{}/available", self.base_url, channel);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<AvailabilityResponse>().await {
                    Ok(body) => body.available,
                    Err(e) => {
                        debug!(channel = %channel, error = %e, "Unparseable availability response");
                        false
                    }
                }
            }
            Ok(response) => {
                debug!(channel = %channel, status = %response.status(), "Availability probe failed");
                false
            }
            Err(e) => {
                debug!(channel = %channel, error = %e, "Availability probe failed");
                false
            }
        }
    }

    async fn query_channel(
        &self,
        channel: &str,
        instance: &Instance,
    ) -> ActivityResult<Option<DateTime<Utc>>> {
        let url = format!("{}/channels/{}/last-activity", self.base_url, channel);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("namespace", instance.key.namespace.as_str()),
                ("instance", instance.key.name.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ActivityError::UnexpectedResponse(format!(
                "channel {} returned status {}",
                channel,
                response.status()
            )));
        }

        let body: LastActivityResponse = response
            .json()
            .await
            .map_err(|e| ActivityError::UnexpectedResponse(e.to_string()))?;

        debug!(
            channel = %channel,
            instance = %instance.key,
            last_activity = ?body.last_activity,
            "Channel queried"
        );

        Ok(body.last_activity)
    }
}

#[async_trait]
impl ActivitySource for HttpActivitySource {
    async fn is_healthy(&self) -> bool {
        let health_url = format!("{}/-/healthy", self.base_url);

        match self.client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "Metrics backend health endpoint not OK");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to reach metrics backend health endpoint");
                return false;
            }
        }

        // The backend process being up is not enough: at least one access
        // channel must be producing data, otherwise every instance would
        // look idle.
        for channel in &self.channels {
            if self.channel_available(channel).await {
                return true;
            }
        }

        warn!("No activity channel is available on the metrics backend");
        false
    }

    async fn last_activity(
        &self,
        instance: &Instance,
    ) -> ActivityResult<Option<DateTime<Utc>>> {
        let mut most_recent: Option<DateTime<Utc>> = None;
        let mut errors = Vec::new();

        for channel in &self.channels {
            match self.query_channel(channel, instance).await {
                Ok(Some(ts)) => {
                    most_recent = Some(match most_recent {
                        Some(current) if current >= ts => current,
                        _ => ts,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(channel = %channel, instance = %instance.key, error = %e, "Channel query failed");
                    errors.push(format!("{channel}: {e}"));
                }
            }
        }

        // A subset of channels failing degrades to the max over the rest;
        // all of them failing means there is no usable signal this pass.
        if most_recent.is_none() && !errors.is_empty() && errors.len() == self.channels.len() {
            return Err(ActivityError::AllChannelsFailed(errors.join("; ")));
        }

        Ok(most_recent)
    }
}
