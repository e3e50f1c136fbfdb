//! Notify-based policy hot-reload watcher.
//!
//! - Watches a single JSON file using notify::RecommendedWatcher.
//! - On create/modify events, reloads and validates it and atomically replaces the cache.
//! - An invalid file leaves the previous policy in force.

use crate::config::loader::load_policy_config_from_file;
use crate::config::PolicyCache;
use crate::errors::GatewayError;
use crate::metrics;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watch the policy file and swap in every valid revision.
pub async fn watch_policy_file(
    path: PathBuf,
    shared_cache: Arc<ArcSwap<PolicyCache>>,
) -> Result<(), notify::Error> {
    // Bridges the watcher's callback thread into this task
    let (tx, mut rx) = mpsc::channel(1);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Err(e) = tx.blocking_send(res) {
                debug!("Failed to send policy file event: {}", e);
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!("Watching policy file for changes: {}", path.display());

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => {
                if should_reload(&event) {
                    info!("Policy file change detected ({:?}), reloading", event.kind);
                    reload_policy(&path, &shared_cache).await;
                } else {
                    debug!("Ignoring irrelevant filesystem event: {:?}", event.kind);
                }
            }
            Err(e) => {
                metrics::record_policy_reload(false);
                error!("Error watching policy file: {}", e);
            }
        }
    }

    warn!("Policy watcher task is shutting down.");
    Ok(())
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
    )
}

/// Reload the policy file and swap it in. Returns whether the swap happened.
pub async fn reload_policy(path: &Path, shared_cache: &Arc<ArcSwap<PolicyCache>>) -> bool {
    let config = match load_policy_config_from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            metrics::record_policy_reload(false);
            match e {
                GatewayError::FileSystemError(io_err) => error!(
                    "Failed to read policy file '{}': {}. Keeping old policy.",
                    path.display(),
                    io_err
                ),
                GatewayError::JsonError(json_err) => error!(
                    "Failed to parse JSON from '{}': {}. Keeping old policy.",
                    path.display(),
                    json_err
                ),
                other => error!(
                    "Policy in '{}' rejected: {}. Keeping old policy.",
                    path.display(),
                    other
                ),
            }
            return false;
        }
    };

    let cache = PolicyCache::new(config);
    metrics::update_policy_metrics(cache.stats().override_count);

    // In-flight requests keep the snapshot they loaded
    shared_cache.store(Arc::new(cache));
    metrics::record_policy_reload(true);
    info!("Policy hot-reloaded successfully.");
    true
}
