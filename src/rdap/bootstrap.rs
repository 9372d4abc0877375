//! RDAP endpoint discovery
//!
//! Discovery is an ordered chain of [`EndpointSource`]s tried in turn; the
//! first one that yields a base URL wins. The chain always terminates on a
//! catch-all endpoint, so discovery as a whole never fails.
use super::response::BootstrapRegistry;
use crate::error::ResolveError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

const MEMO_MAX_ENTRIES: std::num::NonZeroUsize = std::num::NonZeroUsize::new(8192).unwrap();
const MEMO_MAX_AGE_HIT: Duration = Duration::from_secs(6 * 60 * 60);
const MEMO_MAX_AGE_MISS: Duration = Duration::from_secs(10 * 60);

/// A way of mapping a TLD to an RDAP base URL
///
/// An `Err` means "try the next source"; it is logged, never surfaced.
#[async_trait::async_trait]
pub trait EndpointSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn locate(&self, tld: &str) -> Result<String, ResolveError>;
}

/// The IANA bootstrap registry, queried over HTTP
pub struct BootstrapService {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    memo: Mutex<lru::LruCache<String, (Instant, Option<String>)>>,
}

impl BootstrapService {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: url.to_string(),
            timeout,
            memo: Mutex::new(lru::LruCache::new(MEMO_MAX_ENTRIES)),
        }
    }

    fn memoized(&self, tld: &str) -> Option<Option<String>> {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        let (t, v) = memo.get(tld)?;
        let max_age = if v.is_some() {
            MEMO_MAX_AGE_HIT
        } else {
            MEMO_MAX_AGE_MISS
        };
        let stale = t.elapsed() > max_age;
        let v = v.clone();
        if stale {
            debug!("Bootstrap memo for {} is stale", tld);
            memo.pop(tld);
            None
        } else {
            Some(v)
        }
    }

    fn memoize(&self, tld: &str, endpoint: Option<String>) {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.put(tld.to_string(), (Instant::now(), endpoint));
    }

    async fn fetch_registry(&self) -> Result<BootstrapRegistry, ResolveError> {
        let request = async {
            let resp = self.client.get(&self.url).send().await?.error_for_status()?;
            resp.bytes().await
        };
        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))??;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait::async_trait]
impl EndpointSource for BootstrapService {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    async fn locate(&self, tld: &str) -> Result<String, ResolveError> {
        let tld = tld.to_ascii_lowercase();
        let found = match self.memoized(&tld) {
            Some(v) => {
                debug!("Bootstrap memo hit for {}", tld);
                v
            }
            None => {
                debug!("Fetching bootstrap registry {}", self.url);
                let registry = self
                    .fetch_registry()
                    .await
                    .map_err(|e| ResolveError::Discovery(e.to_string()))?;
                let found = registry.endpoint_for(&tld).map(|s| s.to_string());
                self.memoize(&tld, found.clone());
                found
            }
        };
        found.ok_or_else(|| ResolveError::Discovery(format!("no RDAP service for TLD {tld}")))
    }
}

const KNOWN_ENDPOINTS: &[(&str, &str)] = &[
    ("com", "https://rdap.verisign.com/com/v1"),
    ("net", "https://rdap.verisign.com/net/v1"),
    ("org", "https://rdap.publicinterestregistry.org/rdap"),
    ("info", "https://rdap.identitydigital.services/rdap"),
    ("io", "https://rdap.identitydigital.services/rdap"),
    ("app", "https://pubapi.registry.google/rdap"),
    ("dev", "https://pubapi.registry.google/rdap"),
    ("page", "https://pubapi.registry.google/rdap"),
    ("xyz", "https://rdap.centralnic.com/xyz"),
    ("tv", "https://rdap.verisign.com/tv/v1"),
    ("cc", "https://rdap.verisign.com/cc/v1"),
    ("uk", "https://rdap.nominet.uk/uk"),
    ("fr", "https://rdap.nic.fr"),
    ("nl", "https://rdap.sidn.nl"),
    ("br", "https://rdap.registro.br"),
];

/// A static TLD table
pub struct FallbackTable {
    entries: Vec<(String, String)>,
}

impl FallbackTable {
    /// The builtin table of well known registries
    pub fn builtin() -> Self {
        Self::new(KNOWN_ENDPOINTS.iter().map(|(t, u)| (t.to_string(), u.to_string())))
    }

    pub fn new<I: IntoIterator<Item = (String, String)>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl EndpointSource for FallbackTable {
    fn name(&self) -> &'static str {
        "fallback table"
    }

    async fn locate(&self, tld: &str) -> Result<String, ResolveError> {
        self.entries
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(tld))
            .map(|(_, url)| url.trim_end_matches('/').to_string())
            .ok_or_else(|| ResolveError::Discovery(format!("TLD {tld} not in the fallback table")))
    }
}

/// Ordered endpoint discovery terminated by a catch-all endpoint
pub struct EndpointChain {
    sources: Vec<Box<dyn EndpointSource>>,
    default_endpoint: String,
}

impl EndpointChain {
    pub fn new(sources: Vec<Box<dyn EndpointSource>>, default_endpoint: &str) -> Self {
        Self {
            sources,
            default_endpoint: default_endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Finds the base URL to query for `tld`
    pub async fn locate(&self, tld: &str) -> String {
        for source in &self.sources {
            match source.locate(tld).await {
                Ok(endpoint) => {
                    debug!("{} selected {} for TLD {}", source.name(), endpoint, tld);
                    return endpoint;
                }
                Err(e) => warn!("{} could not locate TLD {}: {}", source.name(), tld, e),
            }
        }
        debug!("Using default endpoint {} for TLD {}", self.default_endpoint, tld);
        self.default_endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry_json(endpoint: &str) -> serde_json::Value {
        serde_json::json!({
            "version": "1.0",
            "services": [[["example", "test"], [endpoint]]]
        })
    }

    #[tokio::test]
    async fn fallback_table_is_case_insensitive() {
        let table = FallbackTable::builtin();
        assert_eq!(
            table.locate("COM").await.expect("com"),
            "https://rdap.verisign.com/com/v1"
        );
        assert!(matches!(
            table.locate("zz").await,
            Err(ResolveError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn chain_order() {
        let chain = EndpointChain::new(
            vec![
                Box::new(FallbackTable::new([("a".to_string(), "https://first/".to_string())])),
                Box::new(FallbackTable::new([
                    ("a".to_string(), "https://second".to_string()),
                    ("b".to_string(), "https://second".to_string()),
                ])),
            ],
            "https://catch-all/",
        );
        assert_eq!(chain.locate("a").await, "https://first");
        assert_eq!(chain.locate("b").await, "https://second");
        assert_eq!(chain.locate("c").await, "https://catch-all");
    }

    #[tokio::test]
    async fn bootstrap_is_memoized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rdap/dns.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(registry_json("https://rdap.example/")),
            )
            .expect(2)
            .mount(&server)
            .await;
        let service = BootstrapService::new(
            reqwest::Client::new(),
            &format!("{}/rdap/dns.json", server.uri()),
            Duration::from_secs(5),
        );
        assert_eq!(service.locate("example").await.expect("hit"), "https://rdap.example");
        assert_eq!(service.locate("EXAMPLE").await.expect("memo"), "https://rdap.example");
        // A miss costs one more registry fetch, then is memoized as well
        assert!(service.locate("nope").await.is_err());
        assert!(service.locate("nope").await.is_err());
    }

    #[tokio::test]
    async fn bootstrap_failures_defer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"services\": 42}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        for p in ["/broken.json", "/down.json"] {
            let service = BootstrapService::new(
                reqwest::Client::new(),
                &format!("{}{}", server.uri(), p),
                Duration::from_secs(5),
            );
            assert!(matches!(
                service.locate("example").await,
                Err(ResolveError::Discovery(_))
            ));
        }
    }

    #[tokio::test]
    async fn slow_bootstrap_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rdap/dns.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(registry_json("https://rdap.example/"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let service = BootstrapService::new(
            reqwest::Client::new(),
            &format!("{}/rdap/dns.json", server.uri()),
            Duration::from_millis(200),
        );
        let chain = EndpointChain::new(
            vec![
                Box::new(service),
                Box::new(FallbackTable::new([(
                    "example".to_string(),
                    "https://fallback.example/".to_string(),
                )])),
            ],
            "https://catch-all",
        );

        let started = Instant::now();
        assert_eq!(chain.locate("example").await, "https://fallback.example");
        assert!(started.elapsed() < Duration::from_secs(2));
        // Not in the table either
        assert_eq!(chain.locate("test").await, "https://catch-all");
    }
}
