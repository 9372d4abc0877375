//! The registry record cache
//!
//! Entries are immutable and shared as [`Arc`]s: a refresh swaps the whole
//! entry under the write lock, so readers only ever observe complete entries.
use crate::error::MonitorError;
use crate::{CanonicalRecord, MonitoredDomain};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fqdn: String,
    pub record: CanonicalRecord,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

/// The last failed refresh of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub at: OffsetDateTime,
    pub message: String,
    pub transient: bool,
}

/// Domain keyed store of [`CacheEntry`]s
///
/// Keys are used exactly as given; callers are responsible for consistent
/// casing.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    failures: RwLock<HashMap<String, RefreshFailure>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fqdn: &str) -> Option<Arc<CacheEntry>> {
        read(&self.entries).get(fqdn).cloned()
    }

    /// Inserts or wholesale replaces the entry for `fqdn`
    ///
    /// Also clears any recorded refresh failure.
    pub fn put(
        &self,
        fqdn: &str,
        record: CanonicalRecord,
        fetched_at: OffsetDateTime,
    ) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            fqdn: fqdn.to_string(),
            record,
            fetched_at,
        });
        write(&self.entries).insert(fqdn.to_string(), entry.clone());
        write(&self.failures).remove(fqdn);
        entry
    }

    /// Removes the entry for `fqdn`, returning whether one existed
    pub fn delete(&self, fqdn: &str) -> bool {
        write(&self.failures).remove(fqdn);
        write(&self.entries).remove(fqdn).is_some()
    }

    /// Drops every entry whose key does not satisfy `keep`
    pub fn retain<F: Fn(&str) -> bool>(&self, keep: F) -> usize {
        let mut entries = write(&self.entries);
        let before = entries.len();
        entries.retain(|k, _| keep(k));
        write(&self.failures).retain(|k, _| keep(k));
        before - entries.len()
    }

    /// All entries, ordered by key
    pub fn snapshot(&self) -> Vec<Arc<CacheEntry>> {
        let mut entries: Vec<Arc<CacheEntry>> = read(&self.entries).values().cloned().collect();
        entries.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        entries
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    pub fn record_failure(&self, fqdn: &str, failure: RefreshFailure) {
        write(&self.failures).insert(fqdn.to_string(), failure);
    }

    pub fn last_failure(&self, fqdn: &str) -> Option<RefreshFailure> {
        read(&self.failures).get(fqdn).cloned()
    }

    /// Loads a store previously written by [`flush`](Self::flush)
    ///
    /// A missing file yields an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {}", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<CacheEntry> = serde_json::from_slice(&data)?;
        info!("Loaded {} cached records from {}", entries.len(), path.display());
        Ok(Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|e| (e.fqdn.clone(), Arc::new(e)))
                    .collect(),
            ),
            failures: RwLock::default(),
        })
    }

    /// Writes all entries to `path`, replacing it atomically
    pub fn flush<P: AsRef<Path>>(&self, path: P) -> Result<(), MonitorError> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        let entries: Vec<&CacheEntry> = snapshot.iter().map(|e| e.as_ref()).collect();
        let data = serde_json::to_vec_pretty(&entries)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        debug!("Flushed {} cached records to {}", entries.len(), path.display());
        Ok(())
    }
}

/// Listing orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Soonest expiration first
    #[default]
    ExpirationDate,
    /// Newest registration first
    CreationDate,
    /// Display name
    Name,
}

/// Orders `domains` using their cached records
///
/// Domains without the relevant date (or without a cached record) go last.
pub fn sort_domains(domains: &mut [MonitoredDomain], cache: &CacheStore, by: SortBy) {
    fn dated(
        a: Option<OffsetDateTime>,
        b: Option<OffsetDateTime>,
        newest_first: bool,
    ) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) if newest_first => b.cmp(&a),
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    match by {
        SortBy::Name => domains.sort_by(|a, b| a.name.cmp(&b.name)),
        SortBy::ExpirationDate | SortBy::CreationDate => {
            let dates: HashMap<String, Option<OffsetDateTime>> = domains
                .iter()
                .map(|d| {
                    let record = cache.get(&d.fqdn);
                    let date = record.and_then(|e| match by {
                        SortBy::CreationDate => e.record.created_at,
                        _ => e.record.expires_at,
                    });
                    (d.fqdn.clone(), date)
                })
                .collect();
            let date = |d: &MonitoredDomain| dates.get(&d.fqdn).copied().flatten();
            domains.sort_by(|a, b| dated(date(a), date(b), by == SortBy::CreationDate));
        }
    }
}
