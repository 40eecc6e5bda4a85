// SPDX-License-Identifier: GPL-3.0-or-later

//! Query text normalization.
//!
//! Catalog titles and artists are reduced to bare lowercase words before
//! they are sent to the search service. The primary artist is taken from
//! the first [`ArtistStrategy`] that applies to a song.

use harvest_domain::{FieldValue, NormalizedQuery, Song};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PARENTHETICAL: Regex = Regex::new(r"\([^)]*\)").unwrap();
    static ref BRACKETED: Regex = Regex::new(r"\[[^\]]*\]").unwrap();
    static ref FEATURING: Regex = Regex::new(r"feat\..*").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-z0-9\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize free text for searching.
///
/// Lowercases, drops `(...)` and `[...]` groups and everything from
/// `feat.` onward, turns any other non-alphanumeric character into a space,
/// then collapses whitespace. Missing input yields an empty string. The
/// output only contains `[a-z0-9 ]`, so normalizing twice is a no-op.
pub fn normalize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let lowered = text.to_lowercase();
    let stripped = lowered.trim();
    let stripped = PARENTHETICAL.replace_all(stripped, "");
    let stripped = BRACKETED.replace_all(&stripped, "");
    let stripped = FEATURING.replace_all(&stripped, "");
    let stripped = NON_ALPHANUMERIC.replace_all(&stripped, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Normalize a catalog cell. Only text cells carry a value.
pub fn normalize_field(value: &FieldValue) -> String {
    normalize(value.as_text())
}

/// One way of reading the primary artist out of a song's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistStrategy {
    /// `artist_list` as text: the segment before the first `;`.
    DelimitedList,
    /// `artist_list` as a list: its first element.
    ListColumn,
    /// The plain `artist` field.
    PlainArtist,
}

impl ArtistStrategy {
    /// Strategies in the order they are tried.
    pub const PRIORITY: [ArtistStrategy; 3] = [
        ArtistStrategy::DelimitedList,
        ArtistStrategy::ListColumn,
        ArtistStrategy::PlainArtist,
    ];

    /// Returns `None` when the song's fields do not have the shape this
    /// strategy reads.
    pub fn extract(&self, song: &Song) -> Option<String> {
        match self {
            Self::DelimitedList => song
                .artist_list
                .as_text()
                .map(|list| normalize(list.split(';').next())),
            Self::ListColumn => song
                .artist_list
                .as_list()
                .and_then(|list| list.first())
                .map(|first| normalize(Some(first))),
            Self::PlainArtist => song.artist.as_text().map(|artist| normalize(Some(artist))),
        }
    }
}

/// Normalized primary artist, or an empty string when no strategy applies.
pub fn primary_artist(song: &Song) -> String {
    ArtistStrategy::PRIORITY
        .iter()
        .find_map(|strategy| strategy.extract(song))
        .unwrap_or_default()
}

pub fn build_query(song: &Song) -> NormalizedQuery {
    NormalizedQuery::new(normalize_field(&song.title), primary_artist(song))
}
