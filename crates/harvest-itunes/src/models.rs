// SPDX-License-Identifier: GPL-3.0-or-later

use harvest_domain::MatchMetadata;
use serde::{Deserialize, Serialize};

/// Search query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text search term.
    pub term: String,
    /// Media entity to search for (`song`).
    pub entity: String,
    /// Maximum number of results.
    pub limit: u32,
    /// Two-letter store country code.
    pub country: String,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            entity: "song".to_string(),
            limit: 5,
            country: "US".to_string(),
        }
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }
}

/// Search response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// Number of results in this response.
    #[serde(rename = "resultCount", default)]
    pub result_count: u32,
    /// Results ranked by relevance.
    #[serde(default)]
    pub results: Vec<TrackResult>,
}

impl SearchResponse {
    /// Highest-ranked result, if any.
    pub fn best(self) -> Option<TrackResult> {
        if self.result_count == 0 {
            return None;
        }
        self.results.into_iter().next()
    }
}

/// A single track result. Only the fields the harvester keeps are decoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackResult {
    /// 30-second preview audio.
    #[serde(rename = "previewUrl", default)]
    pub preview_url: Option<String>,
    #[serde(rename = "trackName", default)]
    pub track_name: Option<String>,
    #[serde(rename = "artistName", default)]
    pub artist_name: Option<String>,
    /// Album the track was found on.
    #[serde(rename = "collectionName", default)]
    pub collection_name: Option<String>,
    #[serde(rename = "trackId", default)]
    pub track_id: Option<i64>,
    /// Store page for the track.
    #[serde(rename = "trackViewUrl", default)]
    pub track_view_url: Option<String>,
}

impl From<TrackResult> for MatchMetadata {
    fn from(track: TrackResult) -> Self {
        Self {
            preview_url: track.preview_url,
            track_name: track.track_name,
            artist_name: track.artist_name,
            collection_name: track.collection_name,
            track_id: track.track_id,
            track_view_url: track.track_view_url,
        }
    }
}
