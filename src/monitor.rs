//! Refresh passes
//!
//! A [`Monitor`] owns the cache, the resolver, the mailer and the alert
//! ledger. Each call to [`Monitor::run_pass`] walks the enabled domains,
//! refreshes those the policy selects and dispatches the alerts that are due.
//!
//! Dropping a pass future abandons the in-flight registry queries. Cache
//! updates are single entry swaps, so whatever completed before remains
//! valid and nothing is ever half written.
use crate::alerts::{AlertLedger, AlertMessage, Mailer, crossed_thresholds};
use crate::cache::{CacheEntry, CacheStore, RefreshFailure, SortBy, sort_domains};
use crate::config::{AlertsConfig, Config};
use crate::error::{MonitorError, ResolveFailure};
use crate::rdap::Resolve;
use crate::schedule;
use crate::{CanonicalRecord, MonitoredDomain};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Counters describing a completed pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub evaluated: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub evicted: usize,
}

impl PassSummary {
    /// Whether the pass modified the cache
    pub fn cache_changed(&self) -> bool {
        self.refreshed > 0 || self.evicted > 0
    }

    fn add(&mut self, report: DomainReport) {
        self.evaluated += 1;
        self.refreshed += usize::from(report.refreshed);
        self.failed += usize::from(report.failed);
        self.alerts_sent += report.alerts_sent;
        self.alerts_failed += report.alerts_failed;
    }
}

#[derive(Debug, Default)]
struct DomainReport {
    refreshed: bool,
    failed: bool,
    alerts_sent: usize,
    alerts_failed: usize,
}

pub struct Monitor {
    cache: Arc<CacheStore>,
    resolver: Arc<dyn Resolve>,
    mailer: Arc<dyn Mailer>,
    ledger: AlertLedger,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Monitor {
    pub fn new(
        cache: Arc<CacheStore>,
        resolver: Arc<dyn Resolve>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            cache,
            resolver,
            mailer,
            ledger: AlertLedger::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying cache, shared with readers
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// The cached record for `fqdn`, if any
    pub fn cached_record(&self, fqdn: &str) -> Option<CanonicalRecord> {
        self.cache.get(fqdn).map(|e| e.record.clone())
    }

    /// The last failed refresh of `fqdn`, cleared by the next success
    pub fn last_failure(&self, fqdn: &str) -> Option<RefreshFailure> {
        self.cache.last_failure(fqdn)
    }

    /// A copy of `domains` ordered for display
    pub fn listing(&self, domains: &[MonitoredDomain], by: SortBy) -> Vec<MonitoredDomain> {
        let mut domains = domains.to_vec();
        sort_domains(&mut domains, &self.cache, by);
        domains
    }

    /// Drops everything known about `fqdn`
    ///
    /// Waits for an in-flight refresh of the domain to complete first, so
    /// its result cannot reappear afterwards.
    pub async fn forget(&self, fqdn: &str) -> bool {
        let lock = self.domain_lock(fqdn);
        let _guard = lock.lock().await;
        self.ledger.forget(fqdn);
        self.cache.delete(fqdn)
    }

    fn domain_lock(&self, fqdn: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(fqdn.to_string())
            .or_default()
            .clone()
    }

    /// Queries the registry for `fqdn` regardless of the cached entry's age
    ///
    /// The domain must be part of `domains`. Alerts are left to the next pass.
    #[instrument(level = "error", skip(self, domains))]
    pub async fn force_refresh(
        &self,
        domains: &[MonitoredDomain],
        fqdn: &str,
    ) -> Result<Arc<CacheEntry>, MonitorError> {
        if !domains.iter().any(|d| d.fqdn == fqdn) {
            return Err(MonitorError::UnknownDomain(fqdn.to_string()));
        }
        let lock = self.domain_lock(fqdn);
        let _guard = lock.lock().await;
        info!("Manual refresh requested");
        Ok(self.refresh(fqdn, OffsetDateTime::now_utc()).await?)
    }

    /// Runs one refresh pass over the configured domains
    ///
    /// Domains no longer configured are evicted first. Failures are isolated
    /// per domain and never abort the pass.
    pub async fn run_pass(&self, config: &Config, now: OffsetDateTime) -> PassSummary {
        let mut summary = PassSummary::default();

        let configured: HashSet<&str> = config.domains.iter().map(|d| d.fqdn.as_str()).collect();
        summary.evicted = self.cache.retain(|fqdn| configured.contains(fqdn));
        self.ledger.retain(|fqdn| configured.contains(fqdn));
        // A lock still held elsewhere must stay shared with later callers
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|fqdn, lock| configured.contains(fqdn.as_str()) || Arc::strong_count(lock) > 1);
        if summary.evicted > 0 {
            info!("Evicted {} unmonitored domains", summary.evicted);
        }

        let work: Vec<_> = config
            .enabled_domains()
            .map(|domain| self.process(domain, config, now))
            .collect();
        let reports: Vec<DomainReport> = futures::stream::iter(work)
            .buffer_unordered(config.scheduler.max_concurrent_refreshes)
            .collect()
            .await;
        for report in reports {
            summary.add(report);
        }

        info!(
            "Pass completed:\n\
             \tevaluated: {}\n\
             \trefreshed: {}\n\
             \tfailed: {}\n\
             \talerts sent: {}\n\
             \talerts failed: {}",
            summary.evaluated,
            summary.refreshed,
            summary.failed,
            summary.alerts_sent,
            summary.alerts_failed
        );
        summary
    }

    #[instrument(level = "error", skip_all, fields(fqdn = domain.fqdn))]
    async fn process(
        &self,
        domain: &MonitoredDomain,
        config: &Config,
        now: OffsetDateTime,
    ) -> DomainReport {
        let mut report = DomainReport::default();
        let lock = self.domain_lock(&domain.fqdn);
        let _guard = lock.lock().await;

        let cached = self.cache.get(&domain.fqdn);
        let decision = schedule::evaluate(&domain.fqdn, cached.as_deref(), now, &config.scheduler);
        let current = if !decision.needs_refresh {
            cached
        } else if !config.scheduler.automate_refresh {
            debug!("Refresh due ({}) but automatic refresh is off", decision.describe());
            cached
        } else {
            debug!("Refreshing: {}", decision.describe());
            match self.refresh(&domain.fqdn, now).await {
                Ok(entry) => {
                    report.refreshed = true;
                    Some(entry)
                }
                Err(_) => {
                    report.failed = true;
                    cached
                }
            }
        };

        if let Some(entry) = current {
            self.dispatch_alerts(domain, &entry.record, &config.alerts, now, &mut report)
                .await;
        }
        report
    }

    async fn refresh(
        &self,
        fqdn: &str,
        now: OffsetDateTime,
    ) -> Result<Arc<CacheEntry>, ResolveFailure> {
        match self.resolver.resolve(fqdn).await {
            Ok(record) => Ok(self.cache.put(fqdn, record, now)),
            Err(e) => {
                warn!("{}", e);
                self.cache.record_failure(
                    fqdn,
                    RefreshFailure {
                        at: now,
                        message: e.to_string(),
                        transient: e.is_transient(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn dispatch_alerts(
        &self,
        domain: &MonitoredDomain,
        record: &CanonicalRecord,
        alerts: &AlertsConfig,
        now: OffsetDateTime,
        report: &mut DomainReport,
    ) {
        if !alerts.send_alerts || !domain.alerts {
            return;
        }
        let Some(expires_at) = record.expires_at else {
            return;
        };
        if alerts.admin.is_empty() {
            warn!("Alert due but no admin recipient is configured");
            return;
        }
        for threshold in crossed_thresholds(Some(expires_at), now, alerts) {
            if self.ledger.already_sent(&domain.fqdn, threshold, expires_at) {
                trace!("Alert for {} already sent", threshold);
                continue;
            }
            let message =
                AlertMessage::new(&alerts.admin, &domain.fqdn, threshold, expires_at, now);
            match self.mailer.send_alert(&message).await {
                Ok(()) => {
                    info!("Sent the {} expiration alert", threshold);
                    self.ledger.mark_sent(&domain.fqdn, threshold, expires_at);
                    report.alerts_sent += 1;
                }
                Err(e) => {
                    error!("Failed to send the {} expiration alert: {}", threshold, e);
                    report.alerts_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogMailer;
    use time::macros::datetime;

    struct Unknown;

    #[async_trait::async_trait]
    impl Resolve for Unknown {
        async fn resolve(&self, fqdn: &str) -> Result<CanonicalRecord, ResolveFailure> {
            Ok(CanonicalRecord {
                fqdn: fqdn.to_string(),
                ..Default::default()
            })
        }
    }

    fn config(fqdns: &[&str]) -> Config {
        Config {
            domains: fqdns
                .iter()
                .map(|fqdn| MonitoredDomain {
                    name: fqdn.to_string(),
                    fqdn: fqdn.to_string(),
                    alerts: false,
                    enabled: true,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn locked(monitor: &Monitor) -> Vec<String> {
        let mut keys: Vec<String> = monitor.locks.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn domain_locks_follow_the_domain_list() {
        let monitor = Monitor::new(
            Arc::new(CacheStore::new()),
            Arc::new(Unknown),
            Arc::new(LogMailer),
        );
        let now = datetime!(2026-03-01 09:00 UTC);

        monitor.run_pass(&config(&["a.com", "b.com"]), now).await;
        assert_eq!(locked(&monitor), ["a.com", "b.com"]);

        monitor.run_pass(&config(&["a.com"]), now).await;
        assert_eq!(locked(&monitor), ["a.com"]);

        // Still held by someone: kept so later callers share it
        let held = monitor.domain_lock("c.com");
        let _guard = held.lock().await;
        monitor.run_pass(&config(&[]), now).await;
        assert_eq!(locked(&monitor), ["c.com"]);
    }
}
