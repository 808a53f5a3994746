//! # Directory Cache
//!
//! Point-in-time map from visible store identifiers to platform users, built
//! by paging through the remote user directory and refreshed on a TTL.
//!
//! A snapshot is built off to the side and published with a single pointer
//! swap, so readers see either the previous map or the new one. Rebuilds are
//! single-flight: callers that find the snapshot stale queue on one lock and
//! re-check freshness once they hold it.

pub mod clock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::platform::{PlatformClient, api::PAGE_SIZE};

pub use clock::{Clock, ManualClock, SystemClock};

/// Users fetched between short pauses while rebuilding.
const PAUSE_EVERY_USERS: usize = 1000;
const PAGE_PAUSE: Duration = Duration::from_millis(200);

/// One store's platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryEntry {
    /// Opaque platform user id
    pub id: String,
    /// Human-entered store identifier
    #[serde(rename = "visibleId")]
    pub visible_id: String,
    #[serde(rename = "externalId", default)]
    pub external_id: Option<String>,
    /// `"<first> <last>"`
    #[serde(default)]
    pub name: String,
}

/// An immutable, fully built directory map.
#[derive(Debug)]
pub struct Snapshot {
    entries: HashMap<String, DirectoryEntry>,
    built_at: Instant,
    built_at_utc: DateTime<Utc>,
}

impl Snapshot {
    pub fn get(&self, store_id: &str) -> Option<&DirectoryEntry> {
        self.entries.get(store_id.trim())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at_utc
    }
}

/// Outcome of resolving a batch of store ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub found: Vec<DirectoryEntry>,
    pub not_found: Vec<String>,
}

pub struct DirectoryCache {
    client: PlatformClient,
    attribute_key: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    rebuild_lock: Mutex<()>,
}

impl DirectoryCache {
    pub fn new(
        client: PlatformClient,
        attribute_key: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            attribute_key: attribute_key.into(),
            ttl,
            clock,
            snapshot: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Look up one store id.
    pub async fn resolve(&self, store_id: &str) -> Option<DirectoryEntry> {
        self.snapshot(false).await.get(store_id).cloned()
    }

    /// Partition store ids into found entries and unknown ids, preserving input order.
    pub async fn resolve_all<S: AsRef<str>>(&self, store_ids: &[S]) -> Resolution {
        let snapshot = self.snapshot(false).await;
        let mut resolution = Resolution::default();
        for store_id in store_ids {
            match snapshot.get(store_id.as_ref()) {
                Some(entry) => resolution.found.push(entry.clone()),
                None => resolution.not_found.push(store_id.as_ref().to_string()),
            }
        }
        resolution
    }

    /// Current snapshot, rebuilding first if it is missing, expired or `force`d.
    pub async fn snapshot(&self, force: bool) -> Arc<Snapshot> {
        let observed = self.snapshot.read().await.clone();
        if !force
            && let Some(current) = &observed
            && self.is_fresh(current)
        {
            return current.clone();
        }

        let _guard = self.rebuild_lock.lock().await;

        // Another caller may have rebuilt while we waited for the lock.
        if let Some(current) = self.snapshot.read().await.clone() {
            let replaced = observed
                .as_ref()
                .is_none_or(|seen| !Arc::ptr_eq(seen, &current));
            if self.is_fresh(&current) && (replaced || !force) {
                return current;
            }
        }

        let rebuilt = Arc::new(self.build().await);
        *self.snapshot.write().await = Some(rebuilt.clone());
        rebuilt
    }

    /// Force a rebuild regardless of age.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        self.snapshot(true).await
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        self.clock.now().saturating_duration_since(snapshot.built_at) < self.ttl
    }

    /// Page through the whole directory. A failed page ends the rebuild and the
    /// entries gathered so far are published.
    async fn build(&self) -> Snapshot {
        info!("Refreshing directory snapshot");
        let mut entries = HashMap::new();
        let mut offset = 0;

        loop {
            let page = match self.client.list_users(PAGE_SIZE, offset).await {
                Ok(page) => page,
                Err(err) => {
                    error!(
                        offset,
                        entries = entries.len(),
                        error = %err,
                        "Directory page fetch failed; serving partial snapshot"
                    );
                    break;
                }
            };

            let fetched = page.len();
            for user in page {
                let Some(store_id) = user.profile_value(&self.attribute_key) else {
                    continue;
                };
                entries.insert(
                    store_id.clone(),
                    DirectoryEntry {
                        name: user.display_name(),
                        id: user.id,
                        visible_id: store_id,
                        external_id: user.external_id,
                    },
                );
            }

            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
            if offset % PAUSE_EVERY_USERS == 0 {
                tokio::time::sleep(PAGE_PAUSE).await;
            }
        }

        info!(entries = entries.len(), "Directory snapshot loaded");
        Snapshot {
            entries,
            built_at: self.clock.now(),
            built_at_utc: Utc::now(),
        }
    }
}
