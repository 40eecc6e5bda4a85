// SPDX-License-Identifier: GPL-3.0-or-later

//! Sequential catalog resolution with periodic checkpointing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use harvest_config::AppConfig;
use harvest_domain::{CheckpointSet, MatchResult, ResolutionStatus, Song, SongId};
use harvest_infrastructure::CheckpointRepository;
use harvest_itunes::{LookupOutcome, Sleeper, StopSignal, TokioSleeper, TrackLookup};
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::normalize::build_query;

/// Delay inserted after every lookup so the search service is not hammered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_delay: Duration,
    pub jitter: Duration,
}

impl Pacing {
    /// `min_delay` plus a uniform share of `jitter`.
    pub fn delay(&self) -> Duration {
        self.delay_with_jitter(rand::thread_rng().gen::<f64>())
    }

    pub fn delay_with_jitter(&self, jitter: f64) -> Duration {
        let extra = self.jitter.as_nanos() as f64 * jitter.clamp(0.0, 1.0);
        self.min_delay + Duration::from_nanos(extra as u64)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1300),
            jitter: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Checkpoint after this many newly recorded results.
    pub flush_every: usize,
    pub pacing: Pacing,
    /// Look up songs whose stored status is inconclusive again.
    pub retry_inconclusive: bool,
    pub progress_every: usize,
    pub skip_log_every: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            flush_every: 100,
            pacing: Pacing::default(),
            retry_inconclusive: false,
            progress_every: 50,
            skip_log_every: 500,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            flush_every: config.checkpoint.flush_every.max(1),
            pacing: Pacing {
                min_delay: Duration::from_millis(config.pacing.min_delay_ms),
                jitter: Duration::from_millis(config.pacing.jitter_ms),
            },
            retry_inconclusive: config.checkpoint.retry_failed,
            ..Self::default()
        }
    }
}

/// Counters describing one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub empty_queries: usize,
    pub lookups: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Unmatched songs whose lookup was rejected or abandoned.
    pub inconclusive: usize,
    /// Successful checkpoint flushes, including the final one.
    pub flushes: usize,
    /// Rows in the checkpoint after the final flush.
    pub checkpoint_rows: usize,
    /// The run stopped early on request.
    pub stopped: bool,
}

impl RunSummary {
    pub fn recorded(&self) -> usize {
        self.matched + self.unmatched
    }
}

/// Walks a catalog in order, resolving each song not yet in the checkpoint.
///
/// Each song yields exactly one [`MatchResult`]. The working set is flushed
/// every `flush_every` new results and once more at the end, so an
/// interrupted run loses at most the results since the last flush. A
/// request on the [`stop_handle`](Self::stop_handle) ends the run before the
/// next song, still with a final flush. A lookup cut short by the same
/// request is not recorded.
pub struct CatalogResolver<L, C, S = TokioSleeper> {
    lookup: L,
    store: C,
    sleeper: S,
    settings: ResolverSettings,
    stop: Arc<StopSignal>,
}

impl<L, C> CatalogResolver<L, C, TokioSleeper>
where
    L: TrackLookup,
    C: CheckpointRepository,
{
    pub fn new(lookup: L, store: C, settings: ResolverSettings) -> Self {
        Self::with_sleeper(lookup, store, settings, TokioSleeper)
    }
}

impl<L, C, S> CatalogResolver<L, C, S>
where
    L: TrackLookup,
    C: CheckpointRepository,
    S: Sleeper,
{
    pub fn with_sleeper(lookup: L, store: C, settings: ResolverSettings, sleeper: S) -> Self {
        Self {
            lookup,
            store,
            sleeper,
            settings,
            stop: StopSignal::new(),
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Share an existing stop signal, typically the one the lookup client
    /// watches during backoff.
    pub fn with_stop_signal(mut self, stop: Arc<StopSignal>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    /// Load the checkpoint and resolve every song it does not cover.
    pub async fn run(&self, songs: &[Song]) -> Result<RunSummary> {
        let working = self.store.load().await?;
        self.resolve(songs, working).await
    }

    /// Resolve `songs` on top of an already loaded working set.
    pub async fn resolve(&self, songs: &[Song], mut working: CheckpointSet) -> Result<RunSummary> {
        let total = songs.len();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };
        let mut seen: HashSet<SongId> = HashSet::new();

        info!(
            target: "resolver",
            total,
            checkpointed = working.len(),
            retry_inconclusive = self.settings.retry_inconclusive,
            "starting resolution"
        );

        for (index, song) in songs.iter().enumerate() {
            if self.stop.is_requested() {
                info!(target: "resolver", index, total, "stop requested, finishing early");
                summary.stopped = true;
                break;
            }

            if seen.contains(&song.id)
                || working.is_resolved(song.id, self.settings.retry_inconclusive)
            {
                summary.skipped += 1;
                if index % self.settings.skip_log_every.max(1) == 0 {
                    info!(target: "resolver", index, total, song_id = %song.id, "already resolved, skipping");
                }
                continue;
            }

            let query = build_query(song);
            let looked_up = !query.is_empty();
            let result = if looked_up {
                summary.lookups += 1;
                match self.lookup.lookup(&query).await {
                    LookupOutcome::Interrupted => {
                        info!(target: "resolver", index, song_id = %song.id, "lookup interrupted, leaving song unrecorded");
                        summary.stopped = true;
                        break;
                    }
                    outcome => outcome.into_match_result(song.id, &query),
                }
            } else {
                summary.empty_queries += 1;
                MatchResult::unmatched(song.id, &query, ResolutionStatus::EmptyQuery)
            };

            if result.status == ResolutionStatus::Matched {
                summary.matched += 1;
            } else {
                summary.unmatched += 1;
            }
            if result.status.is_inconclusive() {
                summary.inconclusive += 1;
                warn!(
                    target: "resolver",
                    index,
                    song_id = %song.id,
                    term = %query.term(),
                    status = %result.status,
                    "lookup gave up, recording song without a match"
                );
            }
            debug!(
                target: "resolver",
                song_id = %song.id,
                term = %query.term(),
                status = %result.status,
                "recorded result"
            );

            seen.insert(song.id);
            working.record(result);

            if summary.recorded() % self.settings.flush_every.max(1) == 0 {
                match self.store.flush(&working).await {
                    Ok(()) => summary.flushes += 1,
                    Err(err) => {
                        error!(target: "resolver", error = %err, rows = working.len(), "checkpoint flush failed, continuing");
                    }
                }
            }

            if index % self.settings.progress_every.max(1) == 0 {
                info!(
                    target: "resolver",
                    index,
                    total,
                    matched = summary.matched,
                    unmatched = summary.unmatched,
                    "progress"
                );
            }

            if looked_up {
                self.sleeper.sleep(self.settings.pacing.delay()).await;
            }
        }

        self.store.flush(&working).await?;
        summary.flushes += 1;
        summary.checkpoint_rows = working.len();

        info!(
            target: "resolver",
            total,
            skipped = summary.skipped,
            lookups = summary.lookups,
            matched = summary.matched,
            unmatched = summary.unmatched,
            inconclusive = summary.inconclusive,
            checkpoint_rows = summary.checkpoint_rows,
            stopped = summary.stopped,
            previews = working.matched_count(),
            "resolution complete"
        );
        Ok(summary)
    }
}
