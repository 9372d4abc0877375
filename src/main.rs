use domain_monitor::alerts::LogMailer;
use domain_monitor::cache::CacheStore;
use domain_monitor::config::Config;
use domain_monitor::monitor::Monitor;
use domain_monitor::rdap::Rdap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::signal::unix;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = Config::new()?;

    // Registry access and the cache location are fixed at startup
    let cache_path = config.cache_path.clone();
    let cache = match &cache_path {
        Some(path) => CacheStore::load(path)?,
        None => CacheStore::new(),
    };
    let resolver = Rdap::new(&config.rdap)?;
    let monitor = Monitor::new(Arc::new(cache), Arc::new(resolver), Arc::new(LogMailer));

    // Signal handlers
    let mut sigtask = tokio::spawn(async move {
        let mut sigint = match unix::signal(unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to setup SIGINT handler: {}", e);
                return;
            }
        };
        let mut sigterm = match unix::signal(unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to setup SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigquit = match unix::signal(unix::SignalKind::quit()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to setup SIGQUIT handler: {}", e);
                return;
            }
        };
        tokio::select!(
            _ = sigint.recv() => debug!("SIGINT received"),
            _ = sigterm.recv() => debug!("SIGTERM received"),
            _ = sigquit.recv() => debug!("SIGQUIT received"),
        )
    });

    let mut interval = make_interval(&config);
    info!("Monitoring {} domains", config.enabled_domains().count());
    loop {
        tokio::select!(
            _ = interval.tick() => {}
            _ = &mut sigtask => {
                info!("Signal caught, exiting");
                break;
            }
        );

        // Pick up domain list and policy changes
        match Config::new() {
            Ok(new_config) => {
                if new_config.scheduler.tick_interval_secs != config.scheduler.tick_interval_secs {
                    config = new_config;
                    interval = make_interval(&config);
                    interval.reset();
                } else {
                    config = new_config;
                }
            }
            Err(e) => warn!("Keeping the previous configuration: {}", e),
        }

        let summary = tokio::select!(
            summary = monitor.run_pass(&config, OffsetDateTime::now_utc()) => summary,
            _ = &mut sigtask => {
                info!("Signal caught during a pass, exiting");
                break;
            }
        );
        if summary.cache_changed() {
            flush(monitor.cache(), cache_path.as_deref());
        }
    }
    flush(monitor.cache(), cache_path.as_deref());
    Ok(())
}

fn make_interval(config: &Config) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        config.scheduler.tick_interval_secs,
    ));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    debug!("Pass interval set to {}s", interval.period().as_secs());
    interval
}

fn flush(cache: &CacheStore, path: Option<&str>) {
    if let Some(path) = path {
        if let Err(e) = cache.flush(path) {
            error!("Failed to persist the cache to {}: {}", path, e);
        }
    }
}
