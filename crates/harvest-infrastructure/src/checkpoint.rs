// SPDX-License-Identifier: GPL-3.0-or-later

//! SQLite-backed checkpoint of resolved songs, plus the preview sidecar.

use anyhow::{Context, Result};
use harvest_config::CheckpointConfig;
use harvest_domain::{CheckpointSet, MatchResult, ResolutionStatus, SongId};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::catalog::parse_integral;
use crate::init_database;
use crate::repositories::CheckpointRepository;

const SELECT_MATCHES: &str = r#"
    SELECT song_id, query_title, query_artist, preview_url, track_name, artist_name,
           collection_name, track_id, track_view_url, status
    FROM song_matches
    ORDER BY position
"#;

const INSERT_MATCH: &str = r#"
    INSERT INTO song_matches (
        song_id, position, query_title, query_artist, preview_url, track_name,
        artist_name, collection_name, track_id, track_view_url, status
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Checkpoint stored in a `song_matches` table.
///
/// Every flush rewrites the whole table inside one transaction, then
/// regenerates the `song_id|preview_url` sidecar from the same set.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    preview_index_path: PathBuf,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool, preview_index_path: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            preview_index_path: preview_index_path.into(),
        }
    }

    pub async fn connect(
        database_url: &str,
        preview_index_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let pool = init_database(database_url).await?;
        Ok(Self::new(pool, preview_index_path))
    }

    pub async fn from_config(config: &CheckpointConfig) -> Result<Self> {
        Self::connect(&config.database_url, config.preview_index_path.clone()).await
    }

    pub fn preview_index_path(&self) -> &Path {
        &self.preview_index_path
    }
}

fn row_to_result(row: &SqliteRow) -> Result<MatchResult> {
    let song_id = SongId(row.try_get("song_id")?);
    let raw_status: String = row.try_get("status")?;
    let status = raw_status.parse().unwrap_or_else(|error| {
        warn!(target: "checkpoint", %song_id, %error, "unreadable status, treating as unknown");
        ResolutionStatus::Unknown
    });

    Ok(MatchResult {
        song_id,
        query_title: row.try_get("query_title")?,
        query_artist: row.try_get("query_artist")?,
        preview_url: row.try_get("preview_url")?,
        track_name: row.try_get("track_name")?,
        artist_name: row.try_get("artist_name")?,
        collection_name: row.try_get("collection_name")?,
        track_id: row.try_get("track_id")?,
        track_view_url: row.try_get("track_view_url")?,
        status,
    })
}

#[async_trait::async_trait]
impl CheckpointRepository for SqliteCheckpointStore {
    async fn load(&self) -> Result<CheckpointSet> {
        let rows = sqlx::query(SELECT_MATCHES).fetch_all(&self.pool).await?;
        let results = rows.iter().map(row_to_result).collect::<Result<Vec<_>>>()?;
        let set = CheckpointSet::from_results(results);

        if !set.is_empty() {
            info!(
                target: "checkpoint",
                rows = set.len(),
                matched = set.matched_count(),
                "found existing checkpoint, recorded songs will be skipped"
            );
        }
        Ok(set)
    }

    async fn flush(&self, set: &CheckpointSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM song_matches")
            .execute(&mut *tx)
            .await?;

        for (position, result) in set.iter().enumerate() {
            sqlx::query(INSERT_MATCH)
                .bind(result.song_id.0)
                .bind(position as i64)
                .bind(result.query_title.as_str())
                .bind(result.query_artist.as_str())
                .bind(result.preview_url.as_deref())
                .bind(result.track_name.as_deref())
                .bind(result.artist_name.as_deref())
                .bind(result.collection_name.as_deref())
                .bind(result.track_id)
                .bind(result.track_view_url.as_deref())
                .bind(result.status.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(target: "checkpoint", rows = set.len(), "saved checkpoint");

        // The sidecar is derived from the committed rows; the next flush rewrites it.
        match write_preview_index(&self.preview_index_path, set) {
            Ok(previews) => {
                info!(
                    target: "checkpoint",
                    previews,
                    index = %self.preview_index_path.display(),
                    "wrote preview index"
                );
            }
            Err(error) => {
                warn!(
                    target: "checkpoint",
                    error = %error,
                    index = %self.preview_index_path.display(),
                    "checkpoint saved but preview index could not be written"
                );
            }
        }
        Ok(())
    }
}

/// Write `song_id|preview_url` lines for every row with a preview URL.
///
/// The file is written next to its destination and renamed into place, so a
/// reader never sees a half-written index. Returns the number of lines.
pub fn write_preview_index(path: &Path, set: &CheckpointSet) -> Result<usize> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;

    let mut lines = 0;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        for (song_id, url) in set.preview_index() {
            writeln!(writer, "{}|{}", song_id, url)?;
            lines += 1;
        }
        writer.flush()?;
    }

    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    debug!(target: "checkpoint", path = %path.display(), lines, "wrote preview index");
    Ok(lines)
}

#[derive(Debug, Deserialize)]
struct LegacyRow {
    song_id: String,
    #[serde(default)]
    query_title: Option<String>,
    #[serde(default)]
    query_artist: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    track_name: Option<String>,
    #[serde(default)]
    artist_name: Option<String>,
    #[serde(default)]
    collection_name: Option<String>,
    #[serde(default)]
    track_id: Option<String>,
    #[serde(default)]
    track_view_url: Option<String>,
}

/// Read a checkpoint in the `apple_music_matches.csv` layout.
///
/// Those files carry no status column: rows with any metadata become
/// `matched`, the rest `unknown`. Integer columns may have been written as
/// floats (`12.0`) because of null cells.
pub fn import_legacy_csv(path: &Path) -> Result<CheckpointSet> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening legacy checkpoint {}", path.display()))?;

    let mut set = CheckpointSet::new();
    for (row, record) in reader.deserialize::<LegacyRow>().enumerate() {
        let record = record?;
        let song_id = parse_integral(&record.song_id).with_context(|| {
            format!("row {}: invalid song_id {:?}", row, record.song_id)
        })?;

        let mut result = MatchResult {
            song_id: SongId(song_id),
            query_title: record.query_title.unwrap_or_default(),
            query_artist: record.query_artist.unwrap_or_default(),
            preview_url: record.preview_url,
            track_name: record.track_name,
            artist_name: record.artist_name,
            collection_name: record.collection_name,
            track_id: record.track_id.as_deref().and_then(parse_integral),
            track_view_url: record.track_view_url,
            status: ResolutionStatus::Unknown,
        };
        if result.has_metadata() {
            result.status = ResolutionStatus::Matched;
        }
        set.record(result);
    }

    info!(
        target: "checkpoint",
        path = %path.display(),
        rows = set.len(),
        matched = set.matched_count(),
        "imported legacy checkpoint"
    );
    Ok(set)
}
