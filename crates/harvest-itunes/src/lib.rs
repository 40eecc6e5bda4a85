// SPDX-License-Identifier: GPL-3.0-or-later

//! iTunes Search API client for resolving songs to preview URLs.
//!
//! [`ItunesClient`] performs single search attempts and classifies each HTTP
//! exchange into an [`AttemptOutcome`]. [`MatchClient`] wraps any
//! [`SearchBackend`] in the bounded exponential-backoff retry loop and exposes
//! the result as a [`LookupOutcome`].

pub mod client;
pub mod error;
pub mod lookup;
pub mod models;
pub mod retry;
pub mod stop;

pub use client::{ItunesClient, ItunesClientBuilder};
pub use error::{ItunesError, Result};
pub use lookup::{
    AttemptOutcome, LookupOutcome, MatchClient, NoMatchReason, SearchBackend, TrackLookup,
};
pub use models::{SearchQuery, SearchResponse, TrackResult};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use stop::StopSignal;
