// Transport layer: one HTTP exchange, no retries, no session knowledge.
//
// The controller talks to the network exclusively through the `Transport`
// trait so that TLS policy, timeouts, and cookie handling are explicit
// per-call inputs. `HttpTransport` is the reqwest-backed implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::{COOKIE, HeaderValue};
use tracing::{trace, warn};
use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("rainfly/", env!("CARGO_PKG_VERSION"));

/// Session cookies, keyed by cookie name.
pub type Cookies = BTreeMap<String, String>;

/// HTTP verbs used by the controller API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request, ready to put on the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub cookies: Cookies,
    /// `false` accepts self-signed certificates for this call only.
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl RawRequest {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            json: None,
            cookies: Cookies::new(),
            verify_tls: true,
            timeout,
        }
    }
}

/// What came back from the wire, before any interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// The URL the request was sent to (used in error messages).
    pub url: String,
    pub body: String,
    /// Cookies set by this response.
    pub cookies: Cookies,
}

/// Performs a single HTTP exchange.
///
/// Implementations must map failures onto [`Error::Timeout`],
/// [`Error::PeerDisconnected`], or [`Error::Connectivity`] so the
/// controller can tell a dropped connection from a dead host.
pub trait Transport: Send + Sync {
    fn send(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, Error>>;
}

/// TLS verification mode for local controllers.
///
/// Remote (cloud) calls always verify against the system store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Trust an additional CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate. Controllers ship self-signed certs, so this
    /// is the default.
    #[default]
    DangerAcceptInvalid,
}

impl TlsMode {
    /// Whether requests under this mode verify the server certificate.
    pub fn verifies(&self) -> bool {
        !matches!(self, Self::DangerAcceptInvalid)
    }
}

/// Shared transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(10),
        }
    }
}

/// reqwest-backed [`Transport`].
///
/// Holds two clients so certificate checking can be switched per call
/// without touching any process-wide state.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            verified: build_client(&config.tls, false)?,
            unverified: build_client(&config.tls, true)?,
        })
    }

    async fn execute(&self, request: RawRequest) -> Result<RawResponse, Error> {
        let client = if request.verify_tls {
            &self.verified
        } else {
            &self.unverified
        };
        let url = request.url.clone();
        let timeout = request.timeout;

        let mut builder = client
            .request(request.method.to_reqwest(), request.url)
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.json {
            builder = builder.json(body);
        }
        if let Some(header) = cookie_header(&request.cookies) {
            builder = builder.header(COOKIE, header);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| classify(&e, &url, timeout))?;

        let status = resp.status().as_u16();
        let cookies: Cookies = resp
            .cookies()
            .map(|c| (c.name().to_owned(), c.value().to_owned()))
            .collect();
        trace!(status, cookies = cookies.len(), "response headers received");

        let body = resp
            .text()
            .await
            .map_err(|e| classify(&e, &url, timeout))?;

        Ok(RawResponse {
            status,
            url: url.to_string(),
            body,
            cookies,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, Error>> {
        Box::pin(self.execute(request))
    }
}

fn build_client(tls: &TlsMode, accept_invalid: bool) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

    if accept_invalid {
        builder = builder.danger_accept_invalid_certs(true);
    } else if let TlsMode::CustomCa(path) = tls {
        let cert_pem = std::fs::read(path)
            .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
        let cert = reqwest::Certificate::from_pem(&cert_pem)
            .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
}

/// Join cookies into one `Cookie` header. A pair that is not a legal
/// header value is skipped with a warning; the rest are still sent.
fn cookie_header(cookies: &Cookies) -> Option<HeaderValue> {
    let joined = cookies
        .iter()
        .filter_map(|(name, value)| {
            let pair = format!("{name}={value}");
            if HeaderValue::from_str(&pair).is_ok() {
                Some(pair)
            } else {
                warn!(cookie = %name, "dropping cookie with an invalid header value");
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        return None;
    }
    let mut value = HeaderValue::from_str(&joined).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Map a reqwest failure onto the transport error kinds.
fn classify(err: &reqwest::Error, url: &Url, timeout: Duration) -> Error {
    let url = url.to_string();
    if err.is_timeout() {
        Error::Timeout { url, timeout }
    } else if is_peer_disconnect(err) {
        Error::PeerDisconnected { url }
    } else {
        Error::Connectivity {
            url,
            message: error_chain(err),
        }
    }
}

fn is_peer_disconnect(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_disconnect_kind(io_err.kind()) {
                return true;
            }
        }
        // hyper reports a connection dropped before the response head as
        // an incomplete message without an io::Error underneath.
        if e.to_string()
            .contains("connection closed before message completed")
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}
