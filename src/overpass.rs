use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::bbox::BoundingBox;
use crate::highway::{Highway, Point, Segment};
use crate::pattern::NamePattern;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de";

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    #[serde(default)]
    nodes: Vec<u64>,
    /// Entries are null for nodes the server left out
    #[serde(default)]
    geometry: Vec<Option<LatLon>>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

/// Fetches named highway geometry from an Overpass API server.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OverpassClient {
    /// `endpoint` is the server root, e.g. `https://overpass-api.de`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .user_agent(concat!("perimetra/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn interpreter_url(&self) -> String {
        format!("{}/api/interpreter", self.endpoint)
    }

    /// Overpass QL for every named highway way matching `pattern` in `bbox`.
    pub fn query(bbox: &BoundingBox, pattern: &NamePattern) -> String {
        let regex = pattern.regex_str().replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "[out:json][timeout:120];way[\"highway\"][\"name\"~\"{}\"]{};out geom;",
            regex,
            bbox.to_overpass()
        )
    }

    pub async fn fetch_highway(&self, bbox: &BoundingBox, pattern: &NamePattern) -> Result<Highway> {
        let query = Self::query(bbox, pattern);
        debug!("Overpass query: {}", query);

        let response = self
            .client
            .post(self.interpreter_url())
            .form(&[("data", query.as_str())])
            .send()
            .await
            .with_context(|| format!("Overpass request for {:?} failed", pattern.as_str()))?
            .error_for_status()
            .with_context(|| format!("Overpass rejected query for {:?}", pattern.as_str()))?;

        let body: OverpassResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid Overpass response for {:?}", pattern.as_str()))?;
        if let Some(remark) = &body.remark {
            warn!("Overpass remark for {:?}: {}", pattern.as_str(), remark);
        }

        let highway = highway_from_elements(bbox, pattern, body.elements);
        info!(
            "{}: {} segment(s) from Overpass",
            pattern.as_str(),
            highway.segments.len()
        );
        Ok(highway)
    }

    /// One request per pattern, in the given order.
    pub async fn fetch_highways(
        &self,
        bbox: &BoundingBox,
        patterns: &[NamePattern],
    ) -> Result<Vec<Highway>> {
        let mut highways = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            highways.push(self.fetch_highway(bbox, pattern).await?);
        }
        Ok(highways)
    }
}

fn highway_from_elements(
    bbox: &BoundingBox,
    pattern: &NamePattern,
    elements: Vec<OverpassElement>,
) -> Highway {
    let mut segments = Vec::new();

    for element in elements {
        if element.kind != "way" {
            continue;
        }
        // The server regex dialect is looser than ours, so filter again
        let Some(name) = element.tags.get("name") else {
            continue;
        };
        if !pattern.is_match(name) {
            debug!("Skipping way {} named {:?}", element.id, name);
            continue;
        }

        let mut points = Vec::with_capacity(element.geometry.len());
        for (i, node) in element.geometry.iter().enumerate() {
            match (node, element.nodes.get(i)) {
                (Some(node), Some(&id)) => points.push(Point::with_id(node.lon, node.lat, id)),
                (Some(node), None) => points.push(Point::new(node.lon, node.lat)),
                // Unknown position breaks the way like leaving the box
                (None, _) => points.push(Point::new(f64::NAN, f64::NAN)),
            }
        }

        for run in bbox.clip(&points) {
            if let Ok(segment) = Segment::new(Some(element.id), run) {
                segments.push(segment);
            }
        }
    }

    Highway::new(pattern.clone(), segments)
}
