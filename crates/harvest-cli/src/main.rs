// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use harvest_application::{CatalogResolver, ResolverSettings};
use harvest_config::{load as load_config, AppConfig};
use harvest_infrastructure::{
    import_legacy_csv, load_catalog, CheckpointRepository, SqliteCheckpointStore,
};
use harvest_itunes::{ItunesClient, MatchClient, RetryPolicy, StopSignal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "harvest.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = load_config(Some(&config_path))?;
    init_tracing(&config.telemetry.log_level);
    info!(target: "cli", config = %config_path.display(), "starting preview harvest");

    let songs = load_catalog(&config.catalog.path)
        .with_context(|| format!("loading catalog {}", config.catalog.path.display()))?;

    let store = SqliteCheckpointStore::from_config(&config.checkpoint).await?;
    seed_from_legacy(&store, config.checkpoint.legacy_csv_path.as_deref()).await?;

    // One signal for both layers: a stop ends any retry backoff as well as the song loop
    let stop = StopSignal::new();
    let resolver = CatalogResolver::new(
        build_lookup(&config)?.with_stop_signal(stop.clone()),
        store,
        ResolverSettings::from_config(&config),
    )
    .with_stop_signal(stop.clone());

    tokio::spawn(async move {
        shutdown_signal().await;
        warn!(target: "cli", "stopping after the current request; signal again to exit immediately");
        stop.request();

        shutdown_signal().await;
        warn!(target: "cli", "exiting without a final checkpoint flush");
        std::process::exit(130);
    });

    let summary = resolver.run(&songs).await?;
    info!(
        target: "cli",
        total = summary.total,
        skipped = summary.skipped,
        lookups = summary.lookups,
        matched = summary.matched,
        unmatched = summary.unmatched,
        inconclusive = summary.inconclusive,
        stopped = summary.stopped,
        "harvest finished"
    );

    Ok(())
}

fn config_path(from_env: Option<PathBuf>) -> PathBuf {
    from_env.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer().with_target(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn build_lookup(config: &AppConfig) -> Result<MatchClient<ItunesClient>> {
    let client = ItunesClient::builder()
        .base_url(config.itunes.base_url.as_str())
        .country(config.itunes.country.as_str())
        .entity(config.itunes.entity.as_str())
        .limit(config.itunes.limit)
        .timeout(Duration::from_secs(config.itunes.timeout_secs))
        .build()?;

    let policy = RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_secs(config.retry.max_backoff_secs),
    );
    Ok(MatchClient::new(client, policy))
}

/// Populate an empty checkpoint from a legacy CSV export. Returns the
/// number of imported rows.
async fn seed_from_legacy<C: CheckpointRepository>(
    store: &C,
    legacy_csv: Option<&Path>,
) -> Result<usize> {
    let Some(path) = legacy_csv else {
        return Ok(0);
    };

    if !store.load().await?.is_empty() {
        info!(target: "cli", path = %path.display(), "checkpoint already populated, ignoring legacy csv");
        return Ok(0);
    }

    let imported = import_legacy_csv(path)
        .with_context(|| format!("importing legacy checkpoint {}", path.display()))?;
    store.flush(&imported).await?;
    info!(target: "cli", rows = imported.len(), "seeded checkpoint from legacy csv");
    Ok(imported.len())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(target: "cli", error = %err, "could not install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "cli", error = %err, "could not install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    }

    info!(target: "cli", "shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_defaults_to_harvest_toml() {
        assert_eq!(config_path(None), PathBuf::from("harvest.toml"));
        assert_eq!(
            config_path(Some(PathBuf::from("/etc/harvest/prod.toml"))),
            PathBuf::from("/etc/harvest/prod.toml")
        );
    }

    #[test]
    fn test_build_lookup_uses_retry_config() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 3;
        config.retry.max_backoff_secs = 60;

        let lookup = build_lookup(&config).unwrap();
        assert_eq!(
            *lookup.policy(),
            RetryPolicy::new(3, Duration::from_secs(60))
        );
    }

    async fn store_in(dir: &Path) -> SqliteCheckpointStore {
        let url = format!("sqlite://{}", dir.join("matches.db").display());
        SqliteCheckpointStore::connect(&url, dir.join("previews.txt"))
            .await
            .unwrap()
    }

    const LEGACY_CSV: &str = "song_id,query_title,query_artist,preview_url,track_name,artist_name,collection_name,track_id,track_view_url\n\
        1,hello,adele,https://a.m4a,Hello,Adele,25,1051394215,https://music.apple.com/a\n\
        2,zzz,qqq,,,,,,\n";

    #[tokio::test]
    async fn test_legacy_csv_seeds_empty_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("apple_music_matches.csv");
        std::fs::write(&legacy, LEGACY_CSV).unwrap();
        let store = store_in(dir.path()).await;

        let imported = seed_from_legacy(&store, Some(&legacy)).await.unwrap();

        assert_eq!(imported, 2);
        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_legacy_csv_ignored_when_checkpoint_has_rows() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("apple_music_matches.csv");
        std::fs::write(&legacy, LEGACY_CSV).unwrap();
        let store = store_in(dir.path()).await;
        seed_from_legacy(&store, Some(&legacy)).await.unwrap();

        assert_eq!(seed_from_legacy(&store, Some(&legacy)).await.unwrap(), 0);
        assert_eq!(seed_from_legacy(&store, None).await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_signal_kinds_available() {
        use tokio::signal::unix::SignalKind;
        let _ = SignalKind::interrupt();
        let _ = SignalKind::terminate();
    }
}
