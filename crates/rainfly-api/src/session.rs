// Session state and request dispatch
//
// A `Session` owns the credentials and the current `AuthSession` for one
// controller. Every feature call funnels through `Session::call`, which
// checks the remote capability flag, refreshes an expired token, retries
// once on a dropped connection, and re-authenticates once when the token
// is rejected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{ApiMode, CloudEndpoints, Credentials, Location};
use crate::error::Error;
use crate::response::normalize;
use crate::transport::{Cookies, Method, RawRequest, Transport, TransportConfig};

// ── ApiCall ─────────────────────────────────────────────────────────

/// One request against the controller API, relative to its `api/4` root.
///
/// Carries a capability flag: calls built with
/// [`local_only`](Self::local_only) are refused in remote mode before
/// anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    json: Option<Value>,
    remote_unsupported: Option<&'static str>,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            json: None,
            remote_unsupported: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).json(body)
    }

    /// Append query parameters.
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the JSON request body.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Mark the call as broken on the remote API. `operation` names it in
    /// the resulting error.
    pub fn local_only(mut self, operation: &'static str) -> Self {
        self.remote_unsupported = Some(operation);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the remote API accepts this call.
    pub fn is_remote_supported(&self) -> bool {
        self.remote_unsupported.is_none()
    }
}

// ── Session state ───────────────────────────────────────────────────

/// Authentication state of a controller, derived from its stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never logged in, or the last re-authentication failed.
    Unauthenticated,
    Authenticated,
    /// Logged in, but the stored expiration has passed.
    TokenExpired,
}

/// Token, expiry, and cookies from one successful login.
///
/// Replaced as a whole, never mutated in place.
#[derive(Debug)]
pub(crate) struct AuthSession {
    access_token: SecretString,
    expires_at: Option<DateTime<Utc>>,
    cookies: Cookies,
}

impl AuthSession {
    pub(crate) fn new(
        access_token: SecretString,
        expires_at: Option<DateTime<Utc>>,
        cookies: Cookies,
    ) -> Self {
        Self {
            access_token,
            expires_at,
            cookies,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// ── Session ─────────────────────────────────────────────────────────

pub(crate) struct Session {
    location: Location,
    base_url: Url,
    cloud: CloudEndpoints,
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    config: TransportConfig,
    auth: ArcSwapOption<AuthSession>,
    /// Serializes re-authentication so concurrent callers that all see an
    /// expired token trigger one login.
    refresh_lock: Mutex<()>,
    insecure_warned: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        location: Location,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        config: TransportConfig,
        cloud: CloudEndpoints,
    ) -> Result<Self, Error> {
        let base_url = location.base_url(&cloud)?;
        Ok(Self {
            location,
            base_url,
            cloud,
            credentials,
            transport,
            config,
            auth: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            insecure_warned: AtomicBool::new(false),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn mode(&self) -> ApiMode {
        self.location.mode()
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn cloud(&self) -> &CloudEndpoints {
        &self.cloud
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn transport_config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> SessionState {
        match self.auth.load().as_deref() {
            None => SessionState::Unauthenticated,
            Some(auth) if auth.is_expired(Utc::now()) => SessionState::TokenExpired,
            Some(_) => SessionState::Authenticated,
        }
    }

    pub(crate) fn access_token(&self) -> Option<SecretString> {
        self.auth
            .load()
            .as_deref()
            .map(|auth| auth.access_token.clone())
    }

    pub(crate) fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.auth.load().as_deref().and_then(|auth| auth.expires_at)
    }

    pub(crate) fn cookies(&self) -> Cookies {
        self.auth
            .load()
            .as_deref()
            .map(|auth| auth.cookies.clone())
            .unwrap_or_default()
    }

    /// Push the stored expiry to `at`. Used to simulate token expiry.
    #[cfg(test)]
    pub(crate) fn set_expiry(&self, at: DateTime<Utc>) {
        if let Some(auth) = self.auth.load_full() {
            self.auth.store(Some(Arc::new(AuthSession::new(
                auth.access_token.clone(),
                Some(at),
                auth.cookies.clone(),
            ))));
        }
    }

    /// Resolve a path relative to the API root.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// TLS policy for calls to this controller.
    ///
    /// Remote calls always verify. Local calls follow the configured mode;
    /// the first unverified call logs a warning for this controller only.
    pub(crate) fn verify_tls(&self) -> bool {
        match &self.location {
            Location::Remote { .. } => true,
            Location::Local { host, use_ssl, .. } => {
                let verify = self.config.tls.verifies();
                if !verify && *use_ssl && !self.insecure_warned.swap(true, Ordering::Relaxed) {
                    warn!(%host, "TLS certificate verification disabled for this controller");
                }
                verify
            }
        }
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in and install the resulting session.
    pub(crate) async fn login(&self) -> Result<(), Error> {
        let fresh = self.handshake().await?;
        self.install(fresh);
        Ok(())
    }

    pub(crate) fn install(&self, auth: AuthSession) -> Arc<AuthSession> {
        let auth = Arc::new(auth);
        self.auth.store(Some(Arc::clone(&auth)));
        info!(mode = %self.mode(), "controller session established");
        auth
    }

    /// Replace `stale` with a fresh session, at most one login at a time.
    ///
    /// A caller that waited on the guard reuses the session another caller
    /// just installed. On failure the session is dropped and the controller
    /// stays unauthenticated until an explicit login.
    async fn refresh(&self, stale: &Arc<AuthSession>) -> Result<Arc<AuthSession>, Error> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.auth.load_full() {
            if !Arc::ptr_eq(&current, stale) && !current.is_expired(Utc::now()) {
                debug!("session already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        match self.handshake().await {
            Ok(fresh) => Ok(self.install(fresh)),
            Err(err) => {
                self.auth.store(None);
                warn!(error = %err, "re-authentication failed");
                Err(Error::TokenExpired {
                    message: format!("re-authentication failed: {err}"),
                })
            }
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Issue `call`, applying the capability check, token refresh, and
    /// the two bounded retries.
    pub(crate) async fn call(&self, call: &ApiCall) -> Result<Value, Error> {
        if let (ApiMode::Remote, Some(operation)) = (self.mode(), call.remote_unsupported) {
            return Err(Error::UnknownApiCall {
                message: format!("{operation}() currently broken in remote API"),
            });
        }

        let Some(mut auth) = self.auth.load_full() else {
            return Err(Error::TokenExpired {
                message: "controller is not logged in".into(),
            });
        };

        let mut refreshed = false;
        if auth.is_expired(Utc::now()) {
            debug!("access token expired, re-authenticating before request");
            auth = self.refresh(&auth).await?;
            refreshed = true;
        }

        match self.send(call, &auth).await {
            Err(err) if err.is_auth_rejected() && !refreshed => {
                warn!(path = %call.path, "access token rejected, re-authenticating");
                let auth = self.refresh(&auth).await?;
                self.send(call, &auth).await
            }
            result => result,
        }
    }

    /// Issue `call` and pull the caller's payload out of the body. Shape
    /// errors from `extract` name the request URL.
    pub(crate) async fn call_with<T>(
        &self,
        call: &ApiCall,
        extract: impl FnOnce(Value) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let body = self.call(call).await?;
        extract(body).map_err(|err| self.attribute(err, &call.path))
    }

    /// Name the endpoint at `path` on a shape error that lacks a URL.
    pub(crate) fn attribute(&self, err: Error, path: &str) -> Error {
        match self.endpoint(path) {
            Ok(url) => err.at(url.as_str()),
            Err(_) => err,
        }
    }

    /// Send once; on a dropped connection, send exactly once more.
    async fn send(&self, call: &ApiCall, auth: &AuthSession) -> Result<Value, Error> {
        match self.send_once(call, auth).await {
            Err(Error::PeerDisconnected { url }) => {
                debug!(%url, "peer disconnected, retrying once");
                match self.send_once(call, auth).await {
                    Err(Error::PeerDisconnected { url }) => Err(Error::Request {
                        url,
                        message: "connection dropped by the controller twice in a row".into(),
                        status: None,
                        code: None,
                    }),
                    result => result,
                }
            }
            result => result,
        }
    }

    async fn send_once(&self, call: &ApiCall, auth: &AuthSession) -> Result<Value, Error> {
        let url = self.endpoint(&call.path)?;
        debug!("{} {}", call.method, url);

        let mut request = RawRequest::new(call.method, url, self.config.timeout);
        request
            .headers
            .push(("Accept", "application/json".to_owned()));
        request.query.extend(call.params.iter().cloned());
        request.query.push((
            "access_token".to_owned(),
            auth.access_token.expose_secret().to_owned(),
        ));
        request.json.clone_from(&call.json);
        request.cookies.clone_from(&auth.cookies);
        request.verify_tls = self.verify_tls();

        let raw = self.transport.send(request).await?;
        normalize(raw)?.into_result()
    }
}
