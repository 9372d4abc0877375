//! When to go back to the registry
//!
//! The policy is a pure function of the cached entry, the current time and
//! the scheduler configuration; it performs no I/O and is safe to evaluate as
//! often as desired.
use crate::cache::CacheEntry;
use crate::config::SchedulerConfig;
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};

/// Why a refresh is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefreshReason {
    /// Nothing cached yet
    CacheMiss,
    /// The cached record is older than the stale interval
    StaleIntervalElapsed,
    Within3Months,
    Within2Months,
    Within1Month,
    Within2Weeks,
}

impl RefreshReason {
    /// The standard schedule windows, widest first, with their lead time
    const WINDOWS: [(RefreshReason, i64); 4] = [
        (RefreshReason::Within3Months, 90),
        (RefreshReason::Within2Months, 60),
        (RefreshReason::Within1Month, 30),
        (RefreshReason::Within2Weeks, 14),
    ];
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RefreshReason::CacheMiss => "no cached record",
            RefreshReason::StaleIntervalElapsed => "stale interval elapsed",
            RefreshReason::Within3Months => "within 3 months of expiry",
            RefreshReason::Within2Months => "within 2 months of expiry",
            RefreshReason::Within1Month => "within 1 month of expiry",
            RefreshReason::Within2Weeks => "within 2 weeks of expiry",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshDecision {
    pub fqdn: String,
    pub needs_refresh: bool,
    pub reasons: BTreeSet<RefreshReason>,
}

impl RefreshDecision {
    /// The reasons as a comma separated list, for logging
    pub fn describe(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Decides whether `fqdn` must be refreshed
///
/// A refresh is due when nothing is cached, when the cached record reached
/// the stale interval, or (with the standard schedule) when a window before
/// expiry has opened since the record was fetched. Every applicable reason
/// is reported.
pub fn evaluate(
    fqdn: &str,
    entry: Option<&CacheEntry>,
    now: OffsetDateTime,
    config: &SchedulerConfig,
) -> RefreshDecision {
    let mut reasons = BTreeSet::new();
    match entry {
        None => {
            reasons.insert(RefreshReason::CacheMiss);
        }
        Some(entry) => {
            let age = now - entry.fetched_at;
            if age >= Duration::days(i64::from(config.stale_interval_days)) {
                reasons.insert(RefreshReason::StaleIntervalElapsed);
            }
            if config.use_standard_schedule {
                if let Some(expires_at) = entry.record.expires_at {
                    for (reason, lead_days) in RefreshReason::WINDOWS {
                        let opens = expires_at - Duration::days(lead_days);
                        if now >= opens && entry.fetched_at < opens {
                            reasons.insert(reason);
                        }
                    }
                }
            }
        }
    }
    RefreshDecision {
        fqdn: fqdn.to_string(),
        needs_refresh: !reasons.is_empty(),
        reasons,
    }
}
