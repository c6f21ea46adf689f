// ── Controller handle ──
//
// One physical irrigation controller and its authenticated session.
// Cheap to clone; clones share the same session state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use crate::auth::{ApiMode, Location};
use crate::endpoints::{Api, Programs, Provisioning, Restrictions, Watering, Zones};
use crate::error::Error;
use crate::models::DeviceInfo;
use crate::session::{ApiCall, Session, SessionState};
use crate::transport::{Cookies, Method};

/// A controller loaded through [`Client`](crate::Client).
///
/// Identity (MAC, name, versions) is fixed at load time. The access token,
/// its expiration, and the session cookies change only when the session
/// re-authenticates. Equality is identity: two handles are equal when they
/// refer to the same loaded controller.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    session: Session,
    info: DeviceInfo,
}

impl Controller {
    pub(crate) fn new(session: Session, info: DeviceInfo) -> Self {
        Self {
            inner: Arc::new(ControllerInner { session, info }),
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn mac(&self) -> &str {
        &self.inner.info.mac
    }

    pub fn name(&self) -> &str {
        &self.inner.info.name
    }

    pub fn hardware_version(&self) -> &str {
        &self.inner.info.hardware_version
    }

    pub fn software_version(&self) -> &str {
        &self.inner.info.software_version
    }

    pub fn api_version(&self) -> &str {
        &self.inner.info.api_version
    }

    pub fn mode(&self) -> ApiMode {
        self.inner.session.mode()
    }

    pub fn location(&self) -> &Location {
        self.inner.session.location()
    }

    /// The API root requests are resolved against.
    pub fn base_url(&self) -> &Url {
        self.inner.session.base_url()
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.inner.session.access_token()
    }

    /// Absolute expiry of the current token, when the API reported one.
    pub fn access_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.inner.session.expires_at()
    }

    pub fn cookies(&self) -> Cookies {
        self.inner.session.cookies()
    }

    /// Run the login handshake again with the credentials the controller
    /// was loaded with.
    ///
    /// Needed after a failed automatic re-authentication, which leaves the
    /// controller [`SessionState::Unauthenticated`].
    pub async fn login(&self) -> Result<(), Error> {
        self.inner.session.login().await
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Issue a request against the controller API.
    ///
    /// `path` is relative to the `api/4` root (e.g. `"zone"`). The access
    /// token, cookies, and TLS policy are attached automatically.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        json: Option<Value>,
    ) -> Result<Value, Error> {
        let mut call = ApiCall::new(method, path).params(params.iter().copied());
        if let Some(body) = json {
            call = call.json(body);
        }
        self.call(&call).await
    }

    /// Issue a prepared [`ApiCall`], honoring its remote capability flag.
    pub async fn call(&self, call: &ApiCall) -> Result<Value, Error> {
        self.inner.session.call(call).await
    }

    pub(crate) async fn call_with<T>(
        &self,
        call: &ApiCall,
        extract: impl FnOnce(Value) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.inner.session.call_with(call, extract).await
    }

    pub(crate) fn attribute(&self, err: Error, path: &str) -> Error {
        self.inner.session.attribute(err, path)
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &Session {
        &self.inner.session
    }

    // ── Feature endpoints ────────────────────────────────────────────

    pub fn api(&self) -> Api {
        Api::new(self.clone())
    }

    pub fn programs(&self) -> Programs {
        Programs::new(self.clone())
    }

    pub fn provisioning(&self) -> Provisioning {
        Provisioning::new(self.clone())
    }

    pub fn restrictions(&self) -> Restrictions {
        Restrictions::new(self.clone())
    }

    pub fn watering(&self) -> Watering {
        Watering::new(self.clone())
    }

    pub fn zones(&self) -> Zones {
        Zones::new(self.clone())
    }
}

impl PartialEq for Controller {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Controller {}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("mac", &self.mac())
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
