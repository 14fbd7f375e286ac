//! Durable subscription store.
//!
//! The whole store lives in memory behind one mutex and is written through to
//! a single JSON file on every mutation. A mutation is applied to a copy of
//! the current state, persisted, and only then committed to the cache, so a
//! failed write never leaves the cache ahead of the file.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{SubscriberChannel, TrackedListing};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub threads: Vec<SubscriberChannel>,
}

#[derive(Debug, Clone)]
enum Backend {
    File(PathBuf),
    Memory,
}

impl Backend {
    fn load(&self) -> Result<StoreFile, StoreError> {
        match self {
            Backend::File(path) if path.exists() => {
                let bytes = fs::read(path)?;
                Ok(serde_json::from_slice(&bytes)?)
            }
            _ => Ok(StoreFile::default()),
        }
    }

    fn persist(&self, state: &StoreFile) -> Result<(), StoreError> {
        match self {
            Backend::File(path) => write_atomic(path, state),
            Backend::Memory => Ok(()),
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    PathBuf::from(tmp_name)
}

// Write to a sibling tmp file, fsync, then rename over the target. The tmp
// file never outlives a failed write.
fn write_atomic(path: &Path, state: &StoreFile) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(state)?;
    let tmp_path = tmp_path_for(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&body)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

#[derive(Debug)]
pub struct SubscriptionStore {
    backend: Backend,
    state: Mutex<StoreFile>,
}

impl SubscriptionStore {
    /// Opens a file-backed store. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let backend = Backend::File(path.into());
        let state = backend.load()?;
        Ok(Self {
            backend,
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            state: Mutex::new(StoreFile::default()),
        }
    }

    /// Flushes the current state one last time.
    pub fn close(&self) -> Result<(), StoreError> {
        let state = self.lock();
        self.backend.persist(&state)
    }

    fn lock(&self) -> MutexGuard<'_, StoreFile> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F>(&self, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut StoreFile) -> bool,
    {
        let mut state = self.lock();
        let mut next = state.clone();
        if !apply(&mut next) {
            return Ok(false);
        }
        self.backend.persist(&next)?;
        *state = next;
        Ok(true)
    }

    pub fn list_channels(&self) -> Vec<SubscriberChannel> {
        self.lock().threads.clone()
    }

    pub fn get_channel(&self, channel_id: &str) -> Option<SubscriberChannel> {
        self.lock()
            .threads
            .iter()
            .find(|c| c.channel_id == channel_id)
            .cloned()
    }

    pub fn channel_for_user(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Option<SubscriberChannel> {
        self.lock()
            .threads
            .iter()
            .find(|c| c.community_id == community_id && c.user_id == user_id)
            .cloned()
    }

    /// Returns `false` when the channel was already registered.
    pub fn register_channel(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let created = self.mutate(|state| {
            if state.threads.iter().any(|c| c.channel_id == channel_id) {
                return false;
            }
            state
                .threads
                .push(SubscriberChannel::new(community_id, channel_id, user_id));
            true
        })?;
        if created {
            debug!(%channel_id, %user_id, "channel registered");
        }
        Ok(created)
    }

    pub fn deregister_channel(&self, channel_id: &str) -> Result<bool, StoreError> {
        let removed = self.mutate(|state| {
            let before = state.threads.len();
            state.threads.retain(|c| c.channel_id != channel_id);
            state.threads.len() < before
        })?;
        if removed {
            debug!(%channel_id, "channel deregistered");
        }
        Ok(removed)
    }

    pub fn add_tracked_listing(
        &self,
        channel_id: &str,
        sale_id: i64,
        item_name: &str,
    ) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let Some(channel) = state.threads.iter_mut().find(|c| c.channel_id == channel_id)
            else {
                return false;
            };
            if channel.tracks(sale_id) {
                return false;
            }
            channel
                .tracked_listings
                .push(TrackedListing::new(sale_id, item_name));
            true
        })
    }

    pub fn remove_tracked_listing(
        &self,
        channel_id: &str,
        sale_id: i64,
    ) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let Some(channel) = state.threads.iter_mut().find(|c| c.channel_id == channel_id)
            else {
                return false;
            };
            let before = channel.tracked_listings.len();
            channel.tracked_listings.retain(|l| l.sale_id != sale_id);
            channel.tracked_listings.len() < before
        })
    }

    pub fn list_tracked_listings(&self, channel_id: &str) -> Vec<TrackedListing> {
        self.get_channel(channel_id)
            .map(|c| c.tracked_listings)
            .unwrap_or_default()
    }

    pub fn all_tracked_sale_ids(&self) -> HashSet<i64> {
        self.lock()
            .threads
            .iter()
            .flat_map(|c| c.tracked_listings.iter().map(|l| l.sale_id))
            .collect()
    }

    pub fn channels_tracking(&self, sale_id: i64) -> Vec<SubscriberChannel> {
        self.lock()
            .threads
            .iter()
            .filter(|c| c.tracks(sale_id))
            .cloned()
            .collect()
    }

    pub fn total_tracked(&self) -> usize {
        self.lock()
            .threads
            .iter()
            .map(|c| c.tracked_listings.len())
            .sum()
    }
}
