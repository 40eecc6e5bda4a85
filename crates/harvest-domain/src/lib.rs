// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Stable identifier of a catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SongId(pub i64);

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SongId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A raw catalog cell before any cleaning.
///
/// Catalog exports are not consistent about artist columns: some carry a plain
/// string, some a `;`-delimited string, some an actual list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum FieldValue {
    #[default]
    Missing,
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// One input row. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: FieldValue,
    /// List-shaped artist column (`artist_list`), if the catalog has one.
    pub artist_list: FieldValue,
    /// Plain artist column (`artist` or `artists`).
    pub artist: FieldValue,
}

impl Song {
    pub fn new(id: impl Into<SongId>, title: FieldValue, artist: FieldValue) -> Self {
        Self {
            id: id.into(),
            title,
            artist_list: FieldValue::Missing,
            artist,
        }
    }

    pub fn with_artist_list(mut self, artist_list: FieldValue) -> Self {
        self.artist_list = artist_list;
        self
    }
}

/// Cleaned title/artist pair sent to the search service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedQuery {
    pub title: String,
    pub artist: String,
}

impl NormalizedQuery {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// True when neither field carries usable text.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty()
    }

    /// Free-text search term: title followed by artist.
    pub fn term(&self) -> String {
        format!("{} {}", self.title, self.artist).trim().to_string()
    }
}

// ============================================================================
// Match Results
// ============================================================================

/// Metadata of the top-ranked search result. The service may omit any field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub preview_url: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub collection_name: Option<String>,
    pub track_id: Option<i64>,
    pub track_view_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Matched,
    NoResults,
    EmptyQuery,
    Rejected,
    Abandoned,
    /// Row written before statuses were recorded.
    Unknown,
}

impl ResolutionStatus {
    /// Outcomes that say nothing about whether the song exists remotely.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::Rejected | Self::Abandoned)
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::NoResults => write!(f, "no_results"),
            Self::EmptyQuery => write!(f, "empty_query"),
            Self::Rejected => write!(f, "rejected"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(Self::Matched),
            "no_results" => Ok(Self::NoResults),
            "empty_query" => Ok(Self::EmptyQuery),
            "rejected" => Ok(Self::Rejected),
            "abandoned" => Ok(Self::Abandoned),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown resolution status: {other}")),
        }
    }
}

/// Outcome of resolving one song. Exactly one exists per processed song_id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub song_id: SongId,
    pub query_title: String,
    pub query_artist: String,
    pub preview_url: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub collection_name: Option<String>,
    pub track_id: Option<i64>,
    pub track_view_url: Option<String>,
    pub status: ResolutionStatus,
}

impl MatchResult {
    pub fn matched(song_id: SongId, query: &NormalizedQuery, metadata: MatchMetadata) -> Self {
        Self {
            song_id,
            query_title: query.title.clone(),
            query_artist: query.artist.clone(),
            preview_url: metadata.preview_url,
            track_name: metadata.track_name,
            artist_name: metadata.artist_name,
            collection_name: metadata.collection_name,
            track_id: metadata.track_id,
            track_view_url: metadata.track_view_url,
            status: ResolutionStatus::Matched,
        }
    }

    /// A result with every metadata field null.
    pub fn unmatched(song_id: SongId, query: &NormalizedQuery, status: ResolutionStatus) -> Self {
        Self {
            song_id,
            query_title: query.title.clone(),
            query_artist: query.artist.clone(),
            preview_url: None,
            track_name: None,
            artist_name: None,
            collection_name: None,
            track_id: None,
            track_view_url: None,
            status,
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.preview_url.is_some()
            || self.track_name.is_some()
            || self.artist_name.is_some()
            || self.collection_name.is_some()
            || self.track_id.is_some()
            || self.track_view_url.is_some()
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    Replaced,
}

/// Ordered, song_id-keyed collection of every result produced so far.
///
/// The set never loses a song_id: recording an id that is already present
/// replaces the row in place and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointSet {
    results: Vec<MatchResult>,
    positions: HashMap<SongId, usize>,
}

impl CheckpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_results(results: impl IntoIterator<Item = MatchResult>) -> Self {
        let mut set = Self::new();
        for result in results {
            set.record(result);
        }
        set
    }

    pub fn record(&mut self, result: MatchResult) -> Recorded {
        match self.positions.get(&result.song_id) {
            Some(&index) => {
                self.results[index] = result;
                Recorded::Replaced
            }
            None => {
                self.positions.insert(result.song_id, self.results.len());
                self.results.push(result);
                Recorded::Appended
            }
        }
    }

    pub fn contains(&self, song_id: SongId) -> bool {
        self.positions.contains_key(&song_id)
    }

    pub fn get(&self, song_id: SongId) -> Option<&MatchResult> {
        self.positions.get(&song_id).map(|&index| &self.results[index])
    }

    /// Whether the song needs no further lookups.
    ///
    /// With `retry_inconclusive`, rows whose status is inconclusive count as
    /// unresolved so a later run can try them again.
    pub fn is_resolved(&self, song_id: SongId, retry_inconclusive: bool) -> bool {
        match self.get(song_id) {
            Some(result) => !(retry_inconclusive && result.status.is_inconclusive()),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter()
    }

    pub fn matched_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ResolutionStatus::Matched)
            .count()
    }

    /// `(song_id, preview_url)` for every row that has a preview URL, in set order.
    pub fn preview_index(&self) -> impl Iterator<Item = (SongId, &str)> {
        self.results
            .iter()
            .filter_map(|r| r.preview_url.as_deref().map(|url| (r.song_id, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(title: &str, artist: &str) -> NormalizedQuery {
        NormalizedQuery::new(title, artist)
    }

    fn found(id: i64, preview: Option<&str>) -> MatchResult {
        MatchResult::matched(
            SongId(id),
            &query("hello", "adele"),
            MatchMetadata {
                preview_url: preview.map(str::to_string),
                track_name: Some("Hello".to_string()),
                artist_name: Some("Adele".to_string()),
                collection_name: Some("25".to_string()),
                track_id: Some(1051394215),
                track_view_url: Some("https://music.apple.com/us/album/hello/1051394208".to_string()),
            },
        )
    }

    #[test]
    fn query_term_joins_and_trims() {
        assert_eq!(query("hello", "adele").term(), "hello adele");
        assert_eq!(query("hello", "").term(), "hello");
        assert_eq!(query("", "adele").term(), "adele");
        assert!(query("", "").is_empty());
        assert!(!query("", "adele").is_empty());
    }

    #[test]
    fn unmatched_result_has_no_metadata() {
        let r = MatchResult::unmatched(SongId(3), &query("a", "b"), ResolutionStatus::NoResults);
        assert!(!r.has_metadata());
        assert_eq!(r.query_title, "a");
        assert_eq!(r.query_artist, "b");
        assert!(found(1, Some("https://x")).has_metadata());
    }

    #[test]
    fn status_display_round_trips_through_from_str() {
        for status in [
            ResolutionStatus::Matched,
            ResolutionStatus::NoResults,
            ResolutionStatus::EmptyQuery,
            ResolutionStatus::Rejected,
            ResolutionStatus::Abandoned,
            ResolutionStatus::Unknown,
        ] {
            assert_eq!(status.to_string().parse::<ResolutionStatus>(), Ok(status));
        }
        assert!("bogus".parse::<ResolutionStatus>().is_err());
    }

    #[test]
    fn checkpoint_set_keeps_one_row_per_song() {
        let mut set = CheckpointSet::new();
        assert_eq!(set.record(found(1, Some("https://a"))), Recorded::Appended);
        assert_eq!(
            set.record(MatchResult::unmatched(SongId(2), &query("x", "y"), ResolutionStatus::Abandoned)),
            Recorded::Appended
        );
        assert_eq!(set.record(found(3, None)), Recorded::Appended);

        // Retrying song 2 replaces it in place
        assert_eq!(set.record(found(2, Some("https://b"))), Recorded::Replaced);

        assert_eq!(set.len(), 3);
        let order: Vec<i64> = set.iter().map(|r| r.song_id.0).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(set.get(SongId(2)).map(|r| r.status), Some(ResolutionStatus::Matched));
    }

    #[test]
    fn inconclusive_rows_are_resolved_unless_retry_requested() {
        let set = CheckpointSet::from_results([
            MatchResult::unmatched(SongId(1), &query("a", "b"), ResolutionStatus::NoResults),
            MatchResult::unmatched(SongId(2), &query("a", "b"), ResolutionStatus::Rejected),
            MatchResult::unmatched(SongId(3), &query("a", "b"), ResolutionStatus::Abandoned),
        ]);

        assert!(set.is_resolved(SongId(1), false));
        assert!(set.is_resolved(SongId(2), false));
        assert!(set.is_resolved(SongId(3), false));

        assert!(set.is_resolved(SongId(1), true));
        assert!(!set.is_resolved(SongId(2), true));
        assert!(!set.is_resolved(SongId(3), true));

        assert!(!set.is_resolved(SongId(4), false));
    }

    #[test]
    fn preview_index_skips_rows_without_url() {
        let set = CheckpointSet::from_results([
            found(10, Some("https://a")),
            found(11, None),
            MatchResult::unmatched(SongId(12), &query("", ""), ResolutionStatus::EmptyQuery),
            found(13, Some("https://c")),
        ]);

        let index: Vec<(SongId, &str)> = set.preview_index().collect();
        assert_eq!(index, vec![(SongId(10), "https://a"), (SongId(13), "https://c")]);
        assert_eq!(set.matched_count(), 3);
    }
}
