//! Facilities for reading runtime configuration values
use crate::MonitoredDomain;
use crate::error::MonitorError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Refresh scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Expiration alerts
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Registry access
    #[serde(default)]
    pub rdap: RdapConfig,
    /// Optional file where the registry cache is persisted
    pub cache_path: Option<String>,
    /// The monitored domains
    #[serde(default)]
    pub domains: Vec<MonitoredDomain>,
}

/// Refresh policy and pass scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Age (in days) after which a cached record is considered stale
    pub stale_interval_days: u32,
    /// Additionally refresh when entering the 3 months, 2 months, 1 month and
    /// 2 weeks windows before expiry
    pub use_standard_schedule: bool,
    /// Query registries automatically on every pass
    pub automate_refresh: bool,
    /// Seconds between two passes
    pub tick_interval_secs: u64,
    /// Maximum number of domains refreshed at the same time
    pub max_concurrent_refreshes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stale_interval_days: 190,
            use_standard_schedule: true,
            automate_refresh: true,
            tick_interval_secs: 60 * 60,
            max_concurrent_refreshes: 4,
        }
    }
}

/// Which expiration alerts are sent and to whom
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Alert recipient
    pub admin: String,
    /// Master switch
    pub send_alerts: bool,
    pub send_2_month_alert: bool,
    pub send_1_month_alert: bool,
    pub send_2_week_alert: bool,
    pub send_1_week_alert: bool,
    pub send_3_day_alert: bool,
    /// One alert per day during the last 7 days before expiry
    pub send_daily_expiry_alert: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            admin: String::new(),
            send_alerts: false,
            send_2_month_alert: false,
            send_1_month_alert: true,
            send_2_week_alert: false,
            send_1_week_alert: false,
            send_3_day_alert: true,
            send_daily_expiry_alert: false,
        }
    }
}

/// RDAP endpoints and per hop timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdapConfig {
    /// The IANA bootstrap registry for DNS
    pub bootstrap_url: String,
    /// Bootstrap request timeout in seconds
    pub bootstrap_timeout_secs: u64,
    /// Domain query timeout in seconds
    pub query_timeout_secs: u64,
    /// Endpoint used when neither the bootstrap registry nor the builtin
    /// table know the TLD
    pub default_endpoint: String,
}

impl Default for RdapConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "https://data.iana.org/rdap/dns.json".to_string(),
            bootstrap_timeout_secs: crate::DEFAULT_QUERY_TIMEOUT.as_secs(),
            query_timeout_secs: crate::DEFAULT_QUERY_TIMEOUT.as_secs(),
            default_endpoint: "https://rdap.org".to_string(),
        }
    }
}

impl RdapConfig {
    pub fn bootstrap_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs)
    }
}

impl Config {
    /// Loads the configuration from `monitor.toml` and `MONITOR__` prefixed
    /// environment variables
    pub fn new() -> Result<Self, MonitorError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("monitor.toml"))
                .merge(Env::prefixed("MONITOR__").split("__")),
        )
    }

    /// Extracts and validates the configuration from the given provider chain
    pub fn from_figment(figment: Figment) -> Result<Self, MonitorError> {
        let config: Self = figment.extract().map_err(|err| {
            error!("Failed to validate configuration: {}", err);
            err
        })?;

        macro_rules! check_lower_bound {
            ($parent:ident.$section:ident.$var:ident, $limit:expr) => {
                if $parent.$section.$var < $limit {
                    Err(MonitorError::ConfigParameterValue {
                        parameter: stringify!($var),
                        message: format!(
                            "parameter value should be equal or larger than {}",
                            $limit
                        ),
                    })?
                }
            };
        }
        check_lower_bound!(config.scheduler.stale_interval_days, 1);
        check_lower_bound!(config.scheduler.tick_interval_secs, 1);
        check_lower_bound!(config.scheduler.max_concurrent_refreshes, 1);
        check_lower_bound!(config.rdap.bootstrap_timeout_secs, 1);
        check_lower_bound!(config.rdap.query_timeout_secs, 1);

        trace!("final config: {config:#?}");

        Ok(config)
    }

    /// The monitoring enabled domains
    pub fn enabled_domains(&self) -> impl Iterator<Item = &MonitoredDomain> {
        self.domains.iter().filter(|d| d.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml: &str) -> Result<Config, MonitorError> {
        Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults() {
        let config = load("").expect("config");
        assert_eq!(config.scheduler.stale_interval_days, 190);
        assert!(config.scheduler.use_standard_schedule);
        assert!(config.alerts.send_1_month_alert);
        assert!(config.alerts.send_3_day_alert);
        assert!(!config.alerts.send_alerts);
        assert_eq!(config.rdap.bootstrap_url, "https://data.iana.org/rdap/dns.json");
        assert_eq!(config.rdap.query_timeout(), std::time::Duration::from_secs(10));
        assert!(config.domains.is_empty());
    }

    #[test]
    fn domains_and_overrides() {
        let config = load(
            r#"
            [scheduler]
            stale_interval_days = 30

            [alerts]
            admin = "hostmaster@example.org"
            send_alerts = true

            [[domains]]
            name = "Example"
            fqdn = "example.com"
            alerts = true

            [[domains]]
            name = "Parked"
            fqdn = "example.net"
            enabled = false
            "#,
        )
        .expect("config");
        assert_eq!(config.scheduler.stale_interval_days, 30);
        assert!(config.scheduler.automate_refresh);
        assert_eq!(config.alerts.admin, "hostmaster@example.org");
        assert_eq!(config.domains.len(), 2);
        let enabled: Vec<&str> = config.enabled_domains().map(|d| d.fqdn.as_str()).collect();
        assert_eq!(enabled, ["example.com"]);
        assert!(!config.domains[1].alerts);
    }

    #[test]
    fn out_of_bounds() {
        let err = load("[scheduler]\nmax_concurrent_refreshes = 0\n").unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ConfigParameterValue {
                parameter: "max_concurrent_refreshes",
                ..
            }
        ));
    }
}
