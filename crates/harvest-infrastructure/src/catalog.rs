// SPDX-License-Identifier: GPL-3.0-or-later

//! CSV catalog loading with column detection.
//!
//! Catalog exports differ in shape. Detection order:
//! - identifier: `song_id`, else the 0-based row position
//! - title: `title`, else `title_norm`
//! - artist: `artist_list` (with `artist` as a per-row fallback), else
//!   `artist`, else `artists`

use csv::StringRecord;
use harvest_domain::{FieldValue, Song, SongId};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read catalog: {0}")]
    Csv(#[from] csv::Error),

    #[error("Catalog needs a 'title' or 'title_norm' column")]
    MissingTitle,

    #[error("Catalog needs an 'artist', 'artists', or 'artist_list' column")]
    MissingArtist,

    #[error("Row {row}: invalid song_id {value:?}")]
    InvalidSongId { row: usize, value: String },
}

/// Cell values read as missing, in addition to the empty string.
const NULL_MARKERS: &[&str] = &[
    "nan", "NaN", "-nan", "-NaN", "NA", "N/A", "n/a", "<NA>", "#N/A", "NULL", "null", "None",
];

/// Column positions for the fields a [`Song`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Columns {
    song_id: Option<usize>,
    title: usize,
    artist_list: Option<usize>,
    artist: Option<usize>,
}

impl Columns {
    fn detect(headers: &StringRecord) -> Result<Self, CatalogError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let title = find("title")
            .or_else(|| find("title_norm"))
            .ok_or(CatalogError::MissingTitle)?;

        let artist_list = find("artist_list");
        let artist = find("artist").or_else(|| find("artists"));
        if artist_list.is_none() && artist.is_none() {
            return Err(CatalogError::MissingArtist);
        }

        Ok(Self {
            song_id: find("song_id"),
            title,
            artist_list,
            artist,
        })
    }
}

/// Load the catalog at `path`.
pub fn load_catalog(path: &Path) -> Result<Vec<Song>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::NotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let songs = read_catalog(file)?;
    info!(target: "catalog", path = %path.display(), songs = songs.len(), "loaded catalog");
    Ok(songs)
}

/// Parse a catalog from any CSV source with a header row.
pub fn read_catalog<R: Read>(source: R) -> Result<Vec<Song>, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let columns = Columns::detect(reader.headers()?)?;
    debug!(target: "catalog", ?columns, "detected catalog columns");

    let mut songs = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |index: Option<usize>| index.and_then(|i| record.get(i));

        let id = match cell(columns.song_id) {
            Some(raw) => parse_integral(raw).ok_or_else(|| CatalogError::InvalidSongId {
                row,
                value: raw.to_string(),
            })?,
            None => row as i64,
        };

        songs.push(Song {
            id: SongId(id),
            title: text_cell(cell(Some(columns.title))),
            artist_list: list_cell(cell(columns.artist_list)),
            artist: text_cell(cell(columns.artist)),
        });
    }

    Ok(songs)
}

/// Parse an integer cell, accepting integral floats such as `12.0`.
pub(crate) fn parse_integral(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .then_some(value as i64)
}

fn is_null(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || NULL_MARKERS.contains(&raw)
}

fn text_cell(raw: Option<&str>) -> FieldValue {
    match raw {
        Some(raw) if !is_null(raw) => FieldValue::text(raw),
        _ => FieldValue::Missing,
    }
}

/// Cells of a list-typed column may hold a JSON array (`["a", "b"]`), a
/// quoted bracket list (`['a', 'b']`), or plain text.
fn list_cell(raw: Option<&str>) -> FieldValue {
    let Some(raw) = raw.filter(|r| !is_null(r)) else {
        return FieldValue::Missing;
    };

    let trimmed = raw.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return FieldValue::List(items);
        }
        if let Some(items) = parse_quoted_list(&trimmed[1..trimmed.len() - 1]) {
            return FieldValue::List(items);
        }
    }

    FieldValue::text(raw)
}

/// Split `'a', "b"` into its items. Every item must be quoted.
fn parse_quoted_list(inner: &str) -> Option<Vec<String>> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => return Some(items),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(csv: &str) -> Result<Vec<Song>, CatalogError> {
        read_catalog(csv.as_bytes())
    }

    #[test]
    fn test_explicit_song_id_and_plain_columns() {
        let songs = read("song_id,title,artist\n17,Hello,Adele\n3,Someone Like You,Adele\n").unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].id, SongId(17));
        assert_eq!(songs[0].title, FieldValue::text("Hello"));
        assert_eq!(songs[0].artist, FieldValue::text("Adele"));
        assert_eq!(songs[0].artist_list, FieldValue::Missing);
        assert_eq!(songs[1].id, SongId(3));
    }

    #[test]
    fn test_row_position_when_song_id_absent() {
        let songs = read("title_norm,artists\na,x\nb,y\nc,z\n").unwrap();

        let ids: Vec<i64> = songs.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(songs[2].title, FieldValue::text("c"));
        assert_eq!(songs[2].artist, FieldValue::text("z"));
    }

    #[test]
    fn test_title_preferred_over_title_norm() {
        let songs = read("title_norm,title,artist\nnorm,Real,A\n").unwrap();
        assert_eq!(songs[0].title, FieldValue::text("Real"));
    }

    #[test]
    fn test_artist_list_shapes() {
        let csv = "song_id,title,artist_list,artist\n\
                   1,T,Adele;Drake,\n\
                   2,T,\"[\"\"Adele\"\", \"\"Drake\"\"]\",\n\
                   3,T,\"['Beyonce', 'Jay-Z']\",\n\
                   4,T,,Fallback Artist\n";
        let songs = read(csv).unwrap();

        assert_eq!(songs[0].artist_list, FieldValue::text("Adele;Drake"));
        assert_eq!(songs[1].artist_list, FieldValue::list(["Adele", "Drake"]));
        assert_eq!(songs[2].artist_list, FieldValue::list(["Beyonce", "Jay-Z"]));
        assert_eq!(songs[3].artist_list, FieldValue::Missing);
        assert_eq!(songs[3].artist, FieldValue::text("Fallback Artist"));
    }

    #[test]
    fn test_null_markers_are_missing() {
        let songs = read("song_id,title,artist\n1,NaN,\n2,,None\n").unwrap();
        assert_eq!(songs[0].title, FieldValue::Missing);
        assert_eq!(songs[0].artist, FieldValue::Missing);
        assert_eq!(songs[1].artist, FieldValue::Missing);
    }

    #[test]
    fn test_float_song_ids_are_accepted() {
        let songs = read("song_id,title,artist\n12.0,a,b\n").unwrap();
        assert_eq!(songs[0].id, SongId(12));
    }

    #[test]
    fn test_invalid_song_id_is_fatal() {
        let err = read("song_id,title,artist\n1,a,b\nabc,c,d\n").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSongId { row: 1, .. }));

        let err = read("song_id,title,artist\n1.5,a,b\n").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSongId { row: 0, .. }));
    }

    #[test]
    fn test_missing_columns_are_fatal() {
        assert!(matches!(
            read("song_id,name,artist\n1,a,b\n").unwrap_err(),
            CatalogError::MissingTitle
        ));
        assert!(matches!(
            read("song_id,title,performer\n1,a,b\n").unwrap_err(),
            CatalogError::MissingArtist
        ));
    }

    #[test]
    fn test_short_rows_yield_missing_fields() {
        let songs = read("song_id,title,artist\n5,Only Title\n").unwrap();
        assert_eq!(songs[0].artist, FieldValue::Missing);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_catalog(Path::new("/nonexistent/catalog.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_load_catalog_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged_df_with_ids.csv");
        std::fs::write(&path, "song_id,title,artist\n1,Hello,Adele\n").unwrap();

        let songs = load_catalog(&path).unwrap();
        assert_eq!(songs, vec![Song::new(SongId(1), FieldValue::text("Hello"), FieldValue::text("Adele"))]);
    }

    #[test]
    fn test_parse_quoted_list_rejects_unquoted_items() {
        assert_eq!(parse_quoted_list("'a', 'b'"), Some(vec!["a".into(), "b".into()]));
        assert_eq!(parse_quoted_list("'it\\'s'"), Some(vec!["it's".into()]));
        assert_eq!(parse_quoted_list(""), Some(vec![]));
        assert_eq!(parse_quoted_list("a, b"), None);
        assert_eq!(parse_quoted_list("'a' 'b'"), None);
    }
}
