//! Expiration alerts
use crate::config::AlertsConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Length of the daily reminder window
pub const DAILY_WINDOW_DAYS: i64 = 7;

/// An expiration alert threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Threshold {
    TwoMonths,
    OneMonth,
    TwoWeeks,
    OneWeek,
    ThreeDays,
    /// Daily reminder during the last week, with the whole days left
    Daily(u8),
}

impl Threshold {
    /// The fixed thresholds, widest first
    pub const FIXED: [Threshold; 5] = [
        Threshold::TwoMonths,
        Threshold::OneMonth,
        Threshold::TwoWeeks,
        Threshold::OneWeek,
        Threshold::ThreeDays,
    ];

    /// How long before expiry the threshold is crossed
    pub fn lead_time(&self) -> Duration {
        match self {
            Threshold::TwoMonths => Duration::days(60),
            Threshold::OneMonth => Duration::days(30),
            Threshold::TwoWeeks => Duration::days(14),
            Threshold::OneWeek => Duration::days(7),
            Threshold::ThreeDays => Duration::days(3),
            Threshold::Daily(days) => Duration::days(i64::from(*days) + 1),
        }
    }

    pub fn is_enabled(&self, config: &AlertsConfig) -> bool {
        match self {
            Threshold::TwoMonths => config.send_2_month_alert,
            Threshold::OneMonth => config.send_1_month_alert,
            Threshold::TwoWeeks => config.send_2_week_alert,
            Threshold::OneWeek => config.send_1_week_alert,
            Threshold::ThreeDays => config.send_3_day_alert,
            Threshold::Daily(_) => config.send_daily_expiry_alert,
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Threshold::TwoMonths => f.write_str("2 months"),
            Threshold::OneMonth => f.write_str("1 month"),
            Threshold::TwoWeeks => f.write_str("2 weeks"),
            Threshold::OneWeek => f.write_str("1 week"),
            Threshold::ThreeDays => f.write_str("3 days"),
            Threshold::Daily(0) => f.write_str("less than a day"),
            Threshold::Daily(1) => f.write_str("1 day"),
            Threshold::Daily(days) => write!(f, "{days} days"),
        }
    }
}

/// The thresholds currently crossed by a record expiring at `expires_at`
///
/// At most one fixed threshold is reported: the narrowest enabled one whose
/// boundary has been passed. The daily reminder is reported on its own while
/// less than [`DAILY_WINDOW_DAYS`] are left. An unknown expiration never
/// crosses anything.
pub fn crossed_thresholds(
    expires_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    config: &AlertsConfig,
) -> Vec<Threshold> {
    let Some(expires_at) = expires_at else {
        return Vec::new();
    };
    let mut crossed: Vec<Threshold> = Threshold::FIXED
        .iter()
        .rev()
        .find(|t| t.is_enabled(config) && now >= expires_at - t.lead_time())
        .copied()
        .into_iter()
        .collect();
    let left = expires_at - now;
    if config.send_daily_expiry_alert
        && left.is_positive()
        && left < Duration::days(DAILY_WINDOW_DAYS)
    {
        // whole_days() is within 0..DAILY_WINDOW_DAYS here
        crossed.push(Threshold::Daily(left.whole_days() as u8));
    }
    crossed
}

/// Remembers which thresholds were already alerted, per domain
///
/// Entries are keyed by the expiration they were sent for, so a renewal
/// re-arms every threshold.
#[derive(Debug, Default)]
pub struct AlertLedger {
    sent: Mutex<HashMap<(String, Threshold), OffsetDateTime>>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_sent(
        &self,
        fqdn: &str,
        threshold: Threshold,
        expires_at: OffsetDateTime,
    ) -> bool {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.get(&(fqdn.to_string(), threshold)) == Some(&expires_at)
    }

    pub fn mark_sent(&self, fqdn: &str, threshold: Threshold, expires_at: OffsetDateTime) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.insert((fqdn.to_string(), threshold), expires_at);
    }

    pub fn forget(&self, fqdn: &str) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.retain(|(f, _), _| f != fqdn);
    }

    /// Drops every domain not satisfying `keep`
    pub fn retain<F: Fn(&str) -> bool>(&self, keep: F) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.retain(|(f, _), _| keep(f));
    }
}

/// A rendered expiration alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub recipient: String,
    pub fqdn: String,
    pub threshold: Threshold,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    /// Renders the alert for `threshold`, worded as expired once `now`
    /// reaches `expires_at`
    pub fn new(
        recipient: &str,
        fqdn: &str,
        threshold: Threshold,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Self {
        let body = if now >= expires_at {
            format!("Your domain {fqdn} has expired. Please renew it as soon as possible.")
        } else {
            format!(
                "Your domain {fqdn} is expiring in {threshold}. Please renew it as soon as possible."
            )
        };
        Self {
            recipient: recipient.to_string(),
            fqdn: fqdn.to_string(),
            threshold,
            subject: format!("Domain Expiration Alert: {fqdn}"),
            body,
        }
    }
}

/// Delivers alerts
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_alert(
        &self,
        message: &AlertMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A [`Mailer`] that only logs the alerts
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send_alert(
        &self,
        message: &AlertMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            recipient = message.recipient.as_str(),
            subject = message.subject.as_str(),
            "{}",
            message.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn all_enabled() -> AlertsConfig {
        AlertsConfig {
            admin: "admin@example.org".into(),
            send_alerts: true,
            send_2_month_alert: true,
            send_1_month_alert: true,
            send_2_week_alert: true,
            send_1_week_alert: true,
            send_3_day_alert: true,
            send_daily_expiry_alert: true,
        }
    }

    const EXPIRY: OffsetDateTime = datetime!(2026-06-30 12:00 UTC);

    #[test]
    fn unknown_expiration_never_alerts() {
        let config = all_enabled();
        for days in [-400, -30, -1, 0, 1, 2, 5, 13, 29, 59, 400] {
            let now = EXPIRY + Duration::days(days);
            assert!(crossed_thresholds(None, now, &config).is_empty());
        }
    }

    #[test]
    fn narrowest_crossed_threshold() {
        let config = all_enabled();
        let at = |days_before: i64| {
            crossed_thresholds(Some(EXPIRY), EXPIRY - Duration::days(days_before), &config)
        };
        assert!(at(61).is_empty());
        assert_eq!(at(60), [Threshold::TwoMonths]);
        assert_eq!(at(31), [Threshold::TwoMonths]);
        assert_eq!(at(30), [Threshold::OneMonth]);
        assert_eq!(at(14), [Threshold::TwoWeeks]);
        assert_eq!(at(8), [Threshold::TwoWeeks]);
        assert_eq!(at(7), [Threshold::OneWeek]);
        assert_eq!(at(6), [Threshold::OneWeek, Threshold::Daily(6)]);
        assert_eq!(at(3), [Threshold::ThreeDays, Threshold::Daily(3)]);
        assert_eq!(at(0), [Threshold::ThreeDays]);
        assert_eq!(at(-10), [Threshold::ThreeDays]);
        assert_eq!(
            crossed_thresholds(Some(EXPIRY), EXPIRY - Duration::hours(5), &config),
            [Threshold::ThreeDays, Threshold::Daily(0)]
        );
    }

    #[test]
    fn disabled_thresholds_extend_wider_ones() {
        let config = AlertsConfig::default();
        let at = |days_before: i64| {
            crossed_thresholds(Some(EXPIRY), EXPIRY - Duration::days(days_before), &config)
        };
        assert!(at(45).is_empty());
        assert_eq!(at(30), [Threshold::OneMonth]);
        assert_eq!(at(4), [Threshold::OneMonth]);
        assert_eq!(at(3), [Threshold::ThreeDays]);
    }

    #[test]
    fn ledger() {
        let ledger = AlertLedger::new();
        assert!(!ledger.already_sent("example.com", Threshold::OneMonth, EXPIRY));
        ledger.mark_sent("example.com", Threshold::OneMonth, EXPIRY);
        assert!(ledger.already_sent("example.com", Threshold::OneMonth, EXPIRY));
        assert!(!ledger.already_sent("example.com", Threshold::ThreeDays, EXPIRY));
        assert!(!ledger.already_sent("example.net", Threshold::OneMonth, EXPIRY));
        // renewed
        let renewed = EXPIRY + Duration::days(365);
        assert!(!ledger.already_sent("example.com", Threshold::OneMonth, renewed));
        ledger.forget("example.com");
        assert!(!ledger.already_sent("example.com", Threshold::OneMonth, EXPIRY));
    }

    #[test]
    fn message() {
        let now = EXPIRY - Duration::hours(30);
        let msg = AlertMessage::new(
            "admin@example.org",
            "example.com",
            Threshold::Daily(1),
            EXPIRY,
            now,
        );
        assert_eq!(msg.subject, "Domain Expiration Alert: example.com");
        assert_eq!(
            msg.body,
            "Your domain example.com is expiring in 1 day. Please renew it as soon as possible."
        );
        assert_eq!(Threshold::TwoWeeks.to_string(), "2 weeks");
        assert_eq!(Threshold::Daily(4).to_string(), "4 days");
    }

    #[test]
    fn expired_message() {
        let config = all_enabled();
        for now in [EXPIRY, EXPIRY + Duration::days(12)] {
            let threshold = crossed_thresholds(Some(EXPIRY), now, &config)[0];
            assert_eq!(threshold, Threshold::ThreeDays);
            let msg = AlertMessage::new("admin@example.org", "example.com", threshold, EXPIRY, now);
            assert_eq!(
                msg.body,
                "Your domain example.com has expired. Please renew it as soon as possible."
            );
        }
    }
}
