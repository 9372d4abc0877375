use thiserror::Error;

/// The resolution stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validation of the name itself, before any network activity
    Input,
    Fetch,
    Parse,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Input => "input",
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
        })
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The name cannot be queried (fewer than two labels or not IDNA mappable).
    #[error("invalid domain {0:?}")]
    InvalidDomain(String),

    /// Endpoint discovery failed; the resolver falls back to the static table.
    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    /// Wrapper for [`reqwest::Error`](https://docs.rs/reqwest/latest/reqwest/struct.Error.html)
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The per hop deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The registry replied with a non-2xx status and an RDAP error object.
    #[error("registry error {status}: {title}{}", describe(.description))]
    Protocol {
        status: u16,
        code: Option<u16>,
        title: String,
        description: Vec<String>,
    },

    /// The registry replied with a non-2xx status and no decodable error object.
    #[error("registry returned status {0}")]
    Status(u16),

    /// Wrapper for [`serde_json::Error`](https://docs.rs/serde_json/latest/serde_json/struct.Error.html)
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
}

fn describe(description: &[String]) -> String {
    if description.is_empty() {
        String::new()
    } else {
        format!(" ({})", description.join(" "))
    }
}

impl ResolveError {
    /// Whether a later attempt may succeed
    ///
    /// Only malformed names are permanent; registry errors and malformed
    /// bodies are retried on the next scheduled pass.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ResolveError::InvalidDomain(_))
    }
}

/// A [`ResolveError`] annotated with the domain and stage it occurred at
#[derive(Error, Debug)]
#[error("resolving {fqdn} failed at {stage}: {source}")]
pub struct ResolveFailure {
    pub fqdn: String,
    pub stage: Stage,
    #[source]
    pub source: ResolveError,
}

impl ResolveFailure {
    pub fn new(fqdn: &str, stage: Stage, source: ResolveError) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            stage,
            source,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration parameter value is out of bounds.
    #[error("config parameter {parameter:?} value is out of bounds: {message}")]
    ConfigParameterValue {
        parameter: &'static str,
        message: String,
    },

    /// Wrapper for [`Figment::Error`](https://docs.rs/figment/latest/figment/struct.Error.html)
    #[error("config deserialization: {0:?}")]
    ConfigDeserialization(#[from] figment::Error),

    /// Wrapper for [`serde_json::Error`](https://docs.rs/serde_json/latest/serde_json/struct.Error.html)
    #[error("json serialization/deserialization: {0:?}")]
    SerdeJson(#[from] serde_json::Error),

    /// Wrapper for [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html)
    #[error("IO: {0:?}")]
    IO(#[from] std::io::Error),

    /// Wrapper for [`reqwest::Error`](https://docs.rs/reqwest/latest/reqwest/struct.Error.html)
    #[error("HTTP client setup: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The domain is not part of the monitored set.
    #[error("domain {0} is not monitored")]
    UnknownDomain(String),

    /// Wrapper for [`ResolveFailure`]
    #[error(transparent)]
    Resolve(#[from] ResolveFailure),
}
