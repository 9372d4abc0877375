//! # domain-monitor #
//!
//! Tracks the registration lifecycle of a set of monitored domains.
//!
//! Registry data is obtained over RDAP (see [`rdap`]), normalised into a
//! [`CanonicalRecord`] and kept in a [`cache::CacheStore`]. The
//! [`monitor::Monitor`] decides per domain when the cached data must be
//! refreshed ([`schedule`]) and when an expiration alert is due ([`alerts`]).
pub mod alerts;
pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod rdap;
pub mod schedule;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// Per hop timeout applied to both the bootstrap lookup and the record fetch
pub const DEFAULT_QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A domain as configured by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredDomain {
    /// Display name
    pub name: String,
    /// Fully qualified domain name, the unique key
    pub fqdn: String,
    /// Send expiration alerts for this domain
    #[serde(default)]
    pub alerts: bool,
    /// Monitoring enabled for this domain
    #[serde(default = "MonitoredDomain::default_enabled")]
    pub enabled: bool,
}

impl MonitoredDomain {
    fn default_enabled() -> bool {
        true
    }
}

/// Protocol agnostic registry data for a single domain
///
/// A missing `expires_at` means the expiration is *unknown*, never that the
/// domain does not expire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub fqdn: String,
    pub registrar_name: Option<String>,
    pub registrar_organization: Option<String>,
    pub registrar_handle: Option<String>,
    pub nameservers: Vec<String>,
    pub status: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub expires_at: Option<OffsetDateTime>,
}

impl CanonicalRecord {
    /// Whether the record lacks an expiration date
    pub fn is_incomplete(&self) -> bool {
        self.expires_at.is_none()
    }
}
