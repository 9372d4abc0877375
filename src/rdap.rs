pub mod bootstrap;
pub mod normalize;
pub mod response;

use crate::CanonicalRecord;
use crate::config::RdapConfig;
use crate::error::{MonitorError, ResolveError, ResolveFailure, Stage};
use bootstrap::{BootstrapService, EndpointChain, EndpointSource, FallbackTable};
use response::{DomainObject, ErrorObject};
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Produces a canonical record for a domain
#[async_trait::async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, fqdn: &str) -> Result<CanonicalRecord, ResolveFailure>;
}

/// Splits off the TLD of `fqdn`, in its ASCII form
///
/// Returns the ASCII (punycode) name along with its last label.
pub fn split_tld(fqdn: &str) -> Result<(String, String), ResolveError> {
    let invalid = || ResolveError::InvalidDomain(fqdn.to_string());
    let ascii = idna::domain_to_ascii_cow(fqdn.trim().as_bytes(), idna::AsciiDenyList::URL)
        .map_err(|_| invalid())?;
    let ascii = ascii.trim_end_matches('.');
    let labels: Vec<&str> = ascii.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    let tld = labels[labels.len() - 1].to_string();
    Ok((ascii.to_string(), tld))
}

/// RDAP resolver
pub struct Rdap {
    client: reqwest::Client,
    endpoints: EndpointChain,
    query_timeout: Duration,
}

impl Rdap {
    /// Creates a resolver using the IANA bootstrap registry, then the builtin
    /// TLD table, then the configured catch-all endpoint
    pub fn new(config: &RdapConfig) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        let sources: Vec<Box<dyn EndpointSource>> = vec![
            Box::new(BootstrapService::new(
                client.clone(),
                &config.bootstrap_url,
                config.bootstrap_timeout(),
            )),
            Box::new(FallbackTable::builtin()),
        ];
        Ok(Self::with_endpoints(
            client,
            EndpointChain::new(sources, &config.default_endpoint),
            config.query_timeout(),
        ))
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        endpoints: EndpointChain,
        query_timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            query_timeout,
        }
    }

    async fn fetch(&self, url: &str, fqdn: &str) -> Result<DomainObject, ResolveFailure> {
        let fail = |stage: Stage, e: ResolveError| ResolveFailure::new(fqdn, stage, e);
        let request = async {
            let resp = self
                .client
                .get(url)
                .header(
                    reqwest::header::ACCEPT,
                    "application/rdap+json, application/json",
                )
                .send()
                .await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.query_timeout, request)
            .await
            .map_err(|_| fail(Stage::Fetch, ResolveError::Timeout(self.query_timeout)))?
            .map_err(|e| fail(Stage::Fetch, e.into()))?;
        trace!("Response {} from {}: {} bytes", status, url, body.len());

        if !status.is_success() {
            let err = match serde_json::from_slice::<ErrorObject>(&body) {
                Ok(eo) if eo.title.is_some() || eo.description.is_some() => {
                    ResolveError::Protocol {
                        status: status.as_u16(),
                        code: eo.error_code,
                        title: eo
                            .title
                            .or_else(|| status.canonical_reason().map(|s| s.to_string()))
                            .unwrap_or_default(),
                        description: eo.description.unwrap_or_default(),
                    }
                }
                _ => ResolveError::Status(status.as_u16()),
            };
            return Err(fail(Stage::Fetch, err));
        }

        serde_json::from_slice(&body).map_err(|e| fail(Stage::Parse, e.into()))
    }
}

#[async_trait::async_trait]
impl Resolve for Rdap {
    #[instrument(level = "error", skip(self))]
    async fn resolve(&self, fqdn: &str) -> Result<CanonicalRecord, ResolveFailure> {
        let (ascii, tld) =
            split_tld(fqdn).map_err(|e| ResolveFailure::new(fqdn, Stage::Input, e))?;
        debug!("TLD for {} is {}", fqdn, tld);
        let endpoint = self.endpoints.locate(&tld).await;
        let url = format!("{}/domain/{}", endpoint, ascii);
        debug!("Querying RDAP: {}", url);
        let raw = self.fetch(&url, fqdn).await?;

        let normalized = normalize::normalize_detailed(&raw, fqdn);
        for ev in &normalized.unparsed_events {
            warn!(
                "Failed to parse RDAP date {:?} for event {:?} of {}",
                ev.date, ev.action, fqdn
            );
        }
        if normalized.record.is_incomplete() {
            warn!("No expiration date found in RDAP response for {}", fqdn);
        }
        debug!("RDAP result for {}: {:#?}", fqdn, normalized.record);
        Ok(normalized.record)
    }
}
