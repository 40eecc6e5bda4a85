// SPDX-License-Identifier: GPL-3.0-or-later

//! Retrying song lookup on top of a single-attempt search backend.

use crate::error::ItunesError;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::stop::StopSignal;
use harvest_domain::{MatchMetadata, MatchResult, NormalizedQuery, ResolutionStatus, SongId};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Classified result of one search request.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The service returned at least one result; this is the top-ranked one.
    Success(MatchMetadata),
    /// The service answered but found nothing.
    NoMatch,
    /// Transport failure or throttling; worth trying again.
    RetryableFailure(ItunesError),
    /// An answer we do not know how to handle; retrying will not help.
    TerminalFailure(ItunesError),
}

/// Why a lookup ended without a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    NoResults,
    Rejected { status: Option<u16> },
    Abandoned { attempts: u32 },
}

impl NoMatchReason {
    pub fn status(&self) -> ResolutionStatus {
        match self {
            Self::NoResults => ResolutionStatus::NoResults,
            Self::Rejected { .. } => ResolutionStatus::Rejected,
            Self::Abandoned { .. } => ResolutionStatus::Abandoned,
        }
    }
}

/// Final answer for one song. `NoMatch` is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(MatchMetadata),
    NoMatch(NoMatchReason),
    /// A stop request ended the lookup before it reached an answer.
    Interrupted,
}

impl LookupOutcome {
    pub fn into_match_result(self, song_id: SongId, query: &NormalizedQuery) -> MatchResult {
        match self {
            Self::Found(metadata) => MatchResult::matched(song_id, query, metadata),
            Self::NoMatch(reason) => MatchResult::unmatched(song_id, query, reason.status()),
            Self::Interrupted => {
                MatchResult::unmatched(song_id, query, ResolutionStatus::Abandoned)
            }
        }
    }
}

/// One search request for a free-text term.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, term: &str) -> AttemptOutcome;
}

#[async_trait::async_trait]
impl<B: SearchBackend + ?Sized> SearchBackend for Arc<B> {
    async fn search(&self, term: &str) -> AttemptOutcome {
        (**self).search(term).await
    }
}

/// Resolves a normalized query to a match.
#[async_trait::async_trait]
pub trait TrackLookup: Send + Sync {
    async fn lookup(&self, query: &NormalizedQuery) -> LookupOutcome;
}

#[async_trait::async_trait]
impl<L: TrackLookup + ?Sized> TrackLookup for Arc<L> {
    async fn lookup(&self, query: &NormalizedQuery) -> LookupOutcome {
        (**self).lookup(query).await
    }
}

/// Runs a [`SearchBackend`] under a [`RetryPolicy`].
///
/// Only retryable failures are retried. Empty results and unrecognized
/// responses end the lookup on the first attempt. With a [`StopSignal`]
/// attached, a stop request ends any pending backoff and the lookup returns
/// [`LookupOutcome::Interrupted`].
#[derive(Debug, Clone)]
pub struct MatchClient<B, S = TokioSleeper> {
    backend: B,
    policy: RetryPolicy,
    sleeper: S,
    stop: Option<Arc<StopSignal>>,
}

impl<B: SearchBackend> MatchClient<B, TokioSleeper> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self::with_sleeper(backend, policy, TokioSleeper)
    }
}

impl<B: SearchBackend, S: Sleeper> MatchClient<B, S> {
    pub fn with_sleeper(backend: B, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            backend,
            policy,
            sleeper,
            stop: None,
        }
    }

    pub fn with_stop_signal(mut self, stop: Arc<StopSignal>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Look up a raw search term.
    pub async fn lookup_term(&self, term: &str) -> LookupOutcome {
        let term = term.trim();
        if term.is_empty() {
            debug!(target: "retry", "empty search term, skipping request");
            return LookupOutcome::NoMatch(NoMatchReason::NoResults);
        }

        let max_attempts = self.policy.max_attempts;
        for attempt in 0..max_attempts {
            match self.backend.search(term).await {
                AttemptOutcome::Success(metadata) => {
                    debug!(target: "retry", term, attempt, "match found");
                    return LookupOutcome::Found(metadata);
                }
                AttemptOutcome::NoMatch => {
                    debug!(target: "retry", term, attempt, "no results");
                    return LookupOutcome::NoMatch(NoMatchReason::NoResults);
                }
                AttemptOutcome::TerminalFailure(error) => {
                    warn!(target: "retry", term, %error, "giving up on unrecognized response");
                    return LookupOutcome::NoMatch(NoMatchReason::Rejected {
                        status: error.status(),
                    });
                }
                AttemptOutcome::RetryableFailure(error) => {
                    if attempt + 1 == max_attempts {
                        warn!(target: "retry", term, %error, attempt, "final attempt failed");
                        break;
                    }
                    if self.stop.as_ref().is_some_and(|stop| stop.is_requested()) {
                        info!(target: "retry", term, attempt, "stop requested, not retrying");
                        return LookupOutcome::Interrupted;
                    }
                    let delay = self.policy.backoff(attempt);
                    info!(
                        target: "retry",
                        term,
                        %error,
                        attempt,
                        "transient failure, sleeping {:.2}s then retrying",
                        delay.as_secs_f64()
                    );
                    if !self.pause(delay).await {
                        info!(target: "retry", term, attempt, "stop requested during backoff");
                        return LookupOutcome::Interrupted;
                    }
                }
            }
        }

        warn!(target: "retry", term, attempts = max_attempts, "gave up on query");
        LookupOutcome::NoMatch(NoMatchReason::Abandoned {
            attempts: max_attempts,
        })
    }

    /// Sleep for `delay`. Returns `false` when a stop request cut it short.
    async fn pause(&self, delay: Duration) -> bool {
        match &self.stop {
            Some(stop) => tokio::select! {
                biased;
                _ = stop.requested() => false,
                _ = self.sleeper.sleep(delay) => true,
            },
            None => {
                self.sleeper.sleep(delay).await;
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl<B: SearchBackend, S: Sleeper> TrackLookup for MatchClient<B, S> {
    async fn lookup(&self, query: &NormalizedQuery) -> LookupOutcome {
        self.lookup_term(&query.term()).await
    }
}
