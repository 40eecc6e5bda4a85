// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harvest_application::{CatalogResolver, ResolverSettings};
use harvest_domain::{FieldValue, MatchMetadata, NormalizedQuery, Song, SongId};
use harvest_infrastructure::{CheckpointRepository, SqliteCheckpointStore};
use harvest_itunes::{LookupOutcome, NoMatchReason, Sleeper, TrackLookup};

/// Matches even song titles, finds nothing for odd ones.
#[derive(Default)]
struct ParityLookup {
    calls: AtomicUsize,
}

#[async_trait]
impl TrackLookup for ParityLookup {
    async fn lookup(&self, query: &NormalizedQuery) -> LookupOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n: i64 = query
            .title
            .trim_start_matches("track ")
            .parse()
            .unwrap_or(1);
        if n % 2 == 0 {
            LookupOutcome::Found(MatchMetadata {
                preview_url: Some(format!("https://previews.test/{n}.m4a")),
                track_name: Some(query.title.clone()),
                track_id: Some(n),
                ..MatchMetadata::default()
            })
        } else {
            LookupOutcome::NoMatch(NoMatchReason::NoResults)
        }
    }
}

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn catalog(n: i64) -> Vec<Song> {
    (0..n)
        .map(|i| {
            Song::new(
                SongId(i),
                FieldValue::text(format!("Track {i}")),
                FieldValue::text("Band"),
            )
        })
        .collect()
}

async fn open_store(dir: &Path) -> SqliteCheckpointStore {
    let url = format!("sqlite://{}", dir.join("apple_music_matches.db").display());
    SqliteCheckpointStore::connect(&url, dir.join("apple_previews.txt"))
        .await
        .unwrap()
}

async fn run_once(dir: &Path, songs: &[Song]) -> (usize, harvest_application::RunSummary) {
    let lookup = Arc::new(ParityLookup::default());
    let resolver = CatalogResolver::with_sleeper(
        lookup.clone(),
        open_store(dir).await,
        ResolverSettings::default(),
        NoSleep,
    );
    let summary = resolver.run(songs).await.unwrap();
    (lookup.calls.load(Ordering::SeqCst), summary)
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let songs = catalog(120);

    let (first_calls, first) = run_once(dir.path(), &songs).await;
    assert_eq!(first_calls, 120);
    assert_eq!(first.flushes, 2);
    let checkpoint_after_first = open_store(dir.path()).await.load().await.unwrap();
    let sidecar_after_first = std::fs::read_to_string(dir.path().join("apple_previews.txt")).unwrap();

    let (second_calls, second) = run_once(dir.path(), &songs).await;
    assert_eq!(second_calls, 0);
    assert_eq!(second.skipped, 120);

    let checkpoint_after_second = open_store(dir.path()).await.load().await.unwrap();
    let sidecar_after_second = std::fs::read_to_string(dir.path().join("apple_previews.txt")).unwrap();
    assert_eq!(checkpoint_after_first, checkpoint_after_second);
    assert_eq!(sidecar_after_first, sidecar_after_second);
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let songs = catalog(40);

    // Only the first 15 songs made it into the checkpoint
    let (calls, _) = run_once(dir.path(), &songs[..15]).await;
    assert_eq!(calls, 15);

    let (calls, summary) = run_once(dir.path(), &songs).await;
    assert_eq!(calls, 25);
    assert_eq!(summary.skipped, 15);
    assert_eq!(summary.checkpoint_rows, 40);

    let checkpoint = open_store(dir.path()).await.load().await.unwrap();
    let ids: Vec<i64> = checkpoint.iter().map(|r| r.song_id.0).collect();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());
    assert_eq!(checkpoint.matched_count(), 20);

    let sidecar = std::fs::read_to_string(dir.path().join("apple_previews.txt")).unwrap();
    assert_eq!(sidecar.lines().count(), 20);
    assert!(sidecar.starts_with("0|https://previews.test/0.m4a\n2|"));
}
