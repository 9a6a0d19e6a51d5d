//! Per-call options and the transport cache key derived from them.
//!
//! [`RequestOptions`] can be built in code or deserialized from a JSON map
//! using the option names blocking HTTP clients conventionally accept:
//!
//! ```ignore
//! let options = RequestOptions::from_json(r#"{
//!     "timeout": 2.5,
//!     "verify": false,
//!     "proxy": { "https": "http://proxy.local:3128", "no": ["internal.example"] }
//! }"#)?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use http::Uri;
use http::Version;
use serde::Deserialize;
use syncbridge_core::{BridgeError, parse_version};

/// Options for a single bridged call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Delay before sending, in milliseconds.
    #[serde(rename = "delay")]
    delay_ms: Option<f64>,
    /// Transfer and inactivity timeout, in seconds.
    #[serde(rename = "timeout")]
    timeout_secs: Option<f64>,
    /// TCP connect timeout, in seconds.
    #[serde(rename = "connect_timeout")]
    connect_timeout_secs: Option<f64>,
    verify: Option<VerifyOption>,
    cert: Option<CertOption>,
    proxy: Option<ProxyOption>,
    force_ip_resolve: Option<IpFamily>,
    sink: Option<PathBuf>,
    protocols: Option<Vec<String>>,
    stream: bool,
}

/// TLS peer verification setting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VerifyOption {
    /// `true` verifies against the system roots, `false` disables verification.
    Enabled(bool),
    /// Verify against the certificates in this PEM file.
    CaFile(PathBuf),
}

/// Client certificate: a PEM file holding the chain and the private key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CertOption {
    Path(PathBuf),
    WithPassphrase(PathBuf, String),
}

/// Proxy setting: one URI for every scheme, or one per destination scheme.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProxyOption {
    Uri(String),
    PerScheme {
        #[serde(default)]
        http: Option<String>,
        #[serde(default)]
        https: Option<String>,
        /// Hosts that bypass the proxy.
        #[serde(default)]
        no: Vec<String>,
    },
}

/// Address family to restrict connections to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::InvalidConfiguration(format!("invalid request options: {e}")))
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_secs_f64() * 1000.0);
        self
    }

    /// Bound the whole transfer and every gap between body chunks.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn verify(mut self, verify: VerifyOption) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn cert(mut self, cert: CertOption) -> Self {
        self.cert = Some(cert);
        self
    }

    pub fn proxy(mut self, proxy: ProxyOption) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn force_ip_resolve(mut self, family: IpFamily) -> Self {
        self.force_ip_resolve = Some(family);
        self
    }

    /// Also write the response body to `path` as it arrives.
    pub fn sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(path.into());
        self
    }

    /// Override the acceptable protocol versions (`"1.0"`, `"1.1"`, `"2"`).
    pub fn protocols<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = Some(versions.into_iter().map(Into::into).collect());
        self
    }

    /// Read the response body on demand instead of buffering it.
    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn get_delay(&self) -> Result<Option<Duration>, BridgeError> {
        secs_to_duration("delay", self.delay_ms.map(|ms| ms / 1000.0))
    }

    pub fn get_timeout(&self) -> Result<Option<Duration>, BridgeError> {
        secs_to_duration("timeout", self.timeout_secs)
    }

    pub fn get_connect_timeout(&self) -> Result<Option<Duration>, BridgeError> {
        secs_to_duration("connect_timeout", self.connect_timeout_secs)
    }

    pub fn get_sink(&self) -> Option<&Path> {
        self.sink.as_deref()
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Parsed `protocols` override, `None` when not set.
    pub fn get_protocols(&self) -> Result<Option<Vec<Version>>, BridgeError> {
        self.protocols
            .as_ref()
            .map(|list| list.iter().map(|v| parse_version(v)).collect())
            .transpose()
    }

    /// Key of the dedicated transport these options need.
    ///
    /// `None` means the default shared transport applies.
    pub fn transport_key(&self) -> Result<Option<TransportOptionKey>, BridgeError> {
        let key = TransportOptionKey {
            ip_family: self.force_ip_resolve,
            verify: match &self.verify {
                None | Some(VerifyOption::Enabled(true)) => VerifyMode::Default,
                Some(VerifyOption::Enabled(false)) => VerifyMode::Disabled,
                Some(VerifyOption::CaFile(path)) => VerifyMode::CaFile(path.clone()),
            },
            proxy: self.proxy.as_ref().map(ProxyKey::normalize).transpose()?.flatten(),
            client_cert: self.cert.as_ref().map(|cert| match cert {
                CertOption::Path(path) => ClientCertKey {
                    path: path.clone(),
                    passphrase: None,
                },
                CertOption::WithPassphrase(path, passphrase) => ClientCertKey {
                    path: path.clone(),
                    passphrase: Some(passphrase.clone()),
                },
            }),
        };

        Ok((key != TransportOptionKey::default()).then_some(key))
    }
}

fn secs_to_duration(name: &str, secs: Option<f64>) -> Result<Option<Duration>, BridgeError> {
    secs.map(|secs| {
        Duration::try_from_secs_f64(secs)
            .map_err(|e| BridgeError::InvalidConfiguration(format!("invalid {name}: {e}")))
    })
    .transpose()
}

// ============================================================================
// Transport cache key
// ============================================================================

/// How the server certificate is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum VerifyMode {
    #[default]
    Default,
    Disabled,
    CaFile(PathBuf),
}

/// Normalized proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    /// Destination scheme (`http`/`https`) to proxy URI.
    pub schemes: BTreeMap<String, String>,
    /// Lower-cased hosts that bypass the proxy.
    pub no: BTreeSet<String>,
}

impl ProxyKey {
    fn normalize(option: &ProxyOption) -> Result<Option<Self>, BridgeError> {
        let mut schemes = BTreeMap::new();
        let mut no = BTreeSet::new();

        match option {
            ProxyOption::Uri(uri) => {
                let uri = validate_proxy_uri(uri)?;
                schemes.insert("http".to_owned(), uri.clone());
                schemes.insert("https".to_owned(), uri);
            }
            ProxyOption::PerScheme {
                http,
                https,
                no: bypass,
            } => {
                if let Some(uri) = http {
                    schemes.insert("http".to_owned(), validate_proxy_uri(uri)?);
                }
                if let Some(uri) = https {
                    schemes.insert("https".to_owned(), validate_proxy_uri(uri)?);
                }
                no.extend(
                    bypass
                        .iter()
                        .map(|host| host.trim().to_ascii_lowercase())
                        .filter(|host| !host.is_empty()),
                );
            }
        }

        if schemes.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { schemes, no }))
    }
}

/// Proxies are reached over plain TCP, so TLS-wrapped `https://` proxies are not accepted.
const PROXY_SCHEMES: [&str; 3] = ["http", "socks5", "socks5h"];

fn validate_proxy_uri(raw: &str) -> Result<String, BridgeError> {
    let trimmed = raw.trim();
    let uri: Uri = trimmed
        .parse()
        .map_err(|e| BridgeError::InvalidConfiguration(format!("invalid proxy URI {raw:?}: {e}")))?;

    let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
    if !PROXY_SCHEMES.contains(&scheme.as_str()) {
        return Err(BridgeError::InvalidConfiguration(format!(
            "unsupported proxy scheme {scheme:?} in {raw:?}"
        )));
    }
    if uri.host().is_none() {
        return Err(BridgeError::InvalidConfiguration(format!(
            "proxy URI {raw:?} has no host"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Client certificate file and its optional passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientCertKey {
    pub path: PathBuf,
    pub passphrase: Option<String>,
}

/// Normalized transport configuration used to key the client cache.
///
/// Two option sets that mean the same thing produce equal keys regardless of
/// the order in which their entries were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransportOptionKey {
    pub ip_family: Option<IpFamily>,
    pub verify: VerifyMode,
    pub proxy: Option<ProxyKey>,
    pub client_cert: Option<ClientCertKey>,
}
