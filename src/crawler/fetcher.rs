//! Panorama fetcher implementation
//!
//! This module talks to the remote panorama service, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Fetching panorama metadata and its spatial links
//! - Fetching time-machine metadata for temporal links
//! - Resolving a location to the nearest panorama
//! - Retry logic for transient failures

use crate::area::LatLng;
use crate::config::FetcherConfig;
use crate::state::{CaptureDate, NodeId, NodeRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to the panorama service
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed after {attempts} attempts: {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A fetched panorama
#[derive(Debug, Clone, PartialEq)]
pub struct Panorama {
    pub id: NodeId,

    /// What the visited store keeps for this panorama
    pub record: NodeRecord,

    /// Adjacent panoramas, spatial first, then temporal
    pub neighbours: Vec<NodeId>,

    /// False for third-party panoramas, which are crawled through but not kept
    pub recordable: bool,

    /// Service responses, when the fetcher keeps them
    pub raw: Option<RawMetadata>,
}

/// Service responses of one panorama, kept verbatim for archiving
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    /// Body of the metadata response
    pub meta: String,

    /// Time-machine payload as JSON; `None` if it could not be fetched
    pub time_meta: Option<String>,
}

impl Panorama {
    pub fn location(&self) -> LatLng {
        self.record.location
    }
}

/// Result of fetching one panorama
#[derive(Debug)]
pub enum FetchOutcome {
    Found(Panorama),

    /// The service has no usable metadata for this id
    Missing,

    /// The service could not be reached after all retries
    Failed(FetchError),
}

/// Source of panorama metadata
///
/// Implementations retry on their own; an outcome is final for the crawl.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, id: &NodeId) -> FetchOutcome;

    /// Finds the panorama closest to `location` within `radius` meters
    async fn locate(&self, location: LatLng, radius: u32) -> Result<Option<NodeId>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by the remote panorama service
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
    temporal: bool,
    keep_raw: bool,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(&config)?,
            config,
            temporal: false,
            keep_raw: false,
        })
    }

    /// Also follow time-machine links
    pub fn with_temporal(mut self, temporal: bool) -> Self {
        self.temporal = temporal;
        self
    }

    /// Keep the raw responses of recordable panoramas on [`Panorama::raw`]
    pub fn with_raw_metadata(mut self, keep_raw: bool) -> Self {
        self.keep_raw = keep_raw;
        self
    }

    fn metadata_url(&self, id: &NodeId) -> Result<Url, FetchError> {
        Ok(Url::parse_with_params(
            &self.config.metadata_url,
            &[
                ("output", "json"),
                ("v", "4"),
                ("cb_client", "apiv3"),
                ("hl", "en-US"),
                ("oe", "utf-8"),
                ("panoid", id.as_str()),
            ],
        )?)
    }

    fn timemachine_url(&self, id: &NodeId) -> Result<Url, FetchError> {
        let pb = format!(
            "!1m1!1smaps_sv.tactile!2m2!1sen!2sfr!3m3!1m2!1e2!2s{}\
             !4m17!1e1!1e2!1e3!1e4!1e5!1e6!1e8!4m1!1i48!5m1!1e1!5m1!1e2!6m1!1e1!6m1!1e2",
            id
        );
        Ok(Url::parse_with_params(
            &self.config.timemachine_url,
            &[
                ("authuser", "0"),
                ("hl", "en"),
                ("pb", pb.as_str()),
                ("output", "json"),
            ],
        )?)
    }

    fn locate_url(&self, location: LatLng, radius: u32) -> Result<Url, FetchError> {
        let ll = format!("{:.6},{:.6}", location.lat, location.lng);
        let radius = radius.to_string();
        Ok(Url::parse_with_params(
            &self.config.locate_url,
            &[
                ("cb_client", "maps_sv.tactile"),
                ("authuser", "0"),
                ("hl", "en"),
                ("output", "json"),
                ("ll", ll.as_str()),
                ("radius", radius.as_str()),
            ],
        )?)
    }

    /// GETs `url` and returns the body, retrying transient failures
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | 429, 5xx | Retry |
    /// | Other 4xx | Fail immediately |
    /// | Transport error | Retry |
    async fn request_text(&self, url: &Url) -> Result<String, FetchError> {
        let attempts = self.config.max_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => reason = e.to_string(),
                        }
                    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        reason = format!("HTTP {}", status.as_u16());
                    } else {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => reason = e.to_string(),
            }

            if attempt < attempts {
                tracing::warn!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt,
                    attempts,
                    url,
                    reason
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            reason,
        })
    }

    async fn timemachine(&self, id: &NodeId) -> Result<Value, FetchError> {
        let url = self.timemachine_url(id)?;
        let body = self.request_text(&url).await?;
        timemachine_payload(&body).map_err(|reason| FetchError::Malformed {
            url: url.to_string(),
            reason,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, id: &NodeId) -> FetchOutcome {
        let url = match self.metadata_url(id) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Failed(e),
        };

        let body = match self.request_text(&url).await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Failed(e),
        };

        let Some(mut panorama) = parse_metadata(id, &body) else {
            tracing::debug!("No usable metadata for {}", id);
            return FetchOutcome::Missing;
        };

        let keep_raw = self.keep_raw && panorama.recordable;
        let mut time_meta = None;
        if self.temporal || keep_raw {
            match self.timemachine(id).await {
                Ok(payload) => {
                    if self.temporal {
                        match temporal_ids(&payload) {
                            Ok(ids) => panorama.neighbours.extend(ids),
                            Err(e) => tracing::warn!("No temporal neighbours for {}: {}", id, e),
                        }
                    }
                    time_meta = Some(payload.to_string());
                }
                Err(e) => tracing::warn!("Time-machine metadata of {} unavailable: {}", id, e),
            }
        }

        if keep_raw {
            panorama.raw = Some(RawMetadata {
                meta: body,
                time_meta,
            });
        }

        FetchOutcome::Found(panorama)
    }

    async fn locate(&self, location: LatLng, radius: u32) -> Result<Option<NodeId>, FetchError> {
        let url = self.locate_url(location, radius)?;
        let body = self.request_text(&url).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let found: LocateResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(found
            .location
            .and_then(|l| l.pano_id)
            .filter(|id| !id.is_empty())
            .map(NodeId::from))
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(rename = "Location")]
    location: Option<MetaLocation>,
    #[serde(rename = "Data")]
    data: Option<MetaData>,
    #[serde(rename = "Links", default)]
    links: Vec<MetaLink>,
}

#[derive(Debug, Deserialize)]
struct MetaLocation {
    #[serde(deserialize_with = "flexible_f64")]
    lat: f64,
    #[serde(deserialize_with = "flexible_f64")]
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    image_date: Option<String>,
    copyright: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaLink {
    #[serde(rename = "panoId")]
    pano_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    #[serde(rename = "Location")]
    location: Option<LocateLocation>,
}

#[derive(Debug, Deserialize)]
struct LocateLocation {
    #[serde(rename = "panoId")]
    pano_id: Option<String>,
}

/// Coordinates arrive as JSON numbers or as decimal strings
fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Builds a panorama from a metadata response
///
/// Returns `None` when the body carries no valid location.
pub(crate) fn parse_metadata(id: &NodeId, body: &str) -> Option<Panorama> {
    let meta: Metadata = serde_json::from_str(body).ok()?;
    let location = meta.location?;
    let location = LatLng::new(location.lat, location.lng);
    if !location.is_valid() {
        return None;
    }

    let (date, recordable) = match &meta.data {
        Some(data) => (
            data.image_date.as_deref().and_then(parse_image_date),
            data.copyright
                .as_deref()
                .map_or(true, |c| c.contains("Google")),
        ),
        None => (None, true),
    };

    let neighbours = meta
        .links
        .into_iter()
        .filter_map(|link| link.pano_id)
        .filter(|id| !id.is_empty())
        .map(NodeId::from)
        .collect();

    Some(Panorama {
        id: id.clone(),
        record: NodeRecord { location, date },
        neighbours,
        recordable,
        raw: None,
    })
}

/// Parses `"YYYY-MM"`, tolerating spaces after the dash
pub(crate) fn parse_image_date(raw: &str) -> Option<CaptureDate> {
    let (year, month) = raw.trim().split_once('-')?;
    let year = year.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    (1..=12).contains(&month).then_some(CaptureDate { year, month })
}

/// Parses the JSON payload of a time-machine response
///
/// The response is a script whose second line is a nested array with
/// elided `null`s.
pub(crate) fn timemachine_payload(body: &str) -> Result<Value, String> {
    let line = body
        .lines()
        .nth(1)
        .ok_or_else(|| "missing payload line".to_string())?;
    serde_json::from_str(&fill_array_gaps(line)).map_err(|e| e.to_string())
}

/// Temporal neighbour ids in a time-machine payload
///
/// Only the ids that have a capture timestamp are kept.
pub(crate) fn temporal_ids(data: &Value) -> Result<Vec<NodeId>, String> {
    let aux = data
        .get(1)
        .and_then(|v| v.get(0))
        .and_then(|v| v.get(5))
        .and_then(|v| v.get(1))
        .ok_or_else(|| "no time-machine section".to_string())?;

    let ids: Vec<NodeId> = aux
        .get(3)
        .and_then(|v| v.get(0))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get(0)?.get(1)?.as_str())
                .filter(|id| !id.is_empty())
                .map(NodeId::from)
                .collect()
        })
        .unwrap_or_default();

    let stamped = match aux.as_array() {
        Some(items) if items.len() > 9 => items[8].as_array().map_or(0, Vec::len),
        _ => 0,
    };

    // Timestamped captures are the trailing entries of the id list
    let skip = ids.len().saturating_sub(stamped);
    Ok(ids.into_iter().skip(skip).collect())
}

/// Inserts `null` into elided array slots such as `[,` and `,,`
fn fill_array_gaps(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 64);
    let mut in_string = false;
    let mut escaped = false;
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == ',' && matches!(prev, Some('[') | Some(',')) {
            out.push_str("null");
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
        if !c.is_whitespace() {
            prev = Some(c);
        }
    }

    out
}
