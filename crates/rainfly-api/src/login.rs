// Login handshakes
//
// Local controllers take the device password directly. Remote controllers
// need two steps: an account login against the cloud, then a per-sprinkler
// login that yields the token the proxy accepts. Each handshake builds a
// complete `AuthSession`; storing it is the caller's job.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::auth::{
    ACCOUNT_LOGIN_PATH, CloudEndpoints, Credentials, LOCAL_LOGIN_PATH, Location,
    SPRINKLER_LOGIN_PATH, SPRINKLERS_PATH,
};
use crate::error::Error;
use crate::models::{AccountLoginResponse, LoginResponse, Sprinkler, SprinklerList, from_value};
use crate::response::normalize;
use crate::session::{AuthSession, Session};
use crate::transport::{Cookies, Method, RawRequest, Transport, TransportConfig};

/// One unauthenticated JSON exchange: send, normalize, raise, decode.
///
/// Returns the decoded body and whatever cookies the response set.
pub(crate) async fn exchange<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: RawRequest,
) -> Result<(T, Cookies), Error> {
    debug!("{} {}", request.method, request.url);
    let url = request.url.to_string();
    let raw = transport.send(request).await?;
    let cookies = raw.cookies.clone();
    let body = normalize(raw)?.into_result()?;
    let decoded = from_value(body).map_err(|err| err.at(&url))?;
    Ok((decoded, cookies))
}

fn post(url: Url, body: Value, config: &TransportConfig) -> RawRequest {
    let mut request = RawRequest::new(Method::Post, url, config.timeout);
    request.json = Some(body);
    request
}

/// Cloud account login. Returns the account-level access token.
pub(crate) async fn account_login(
    transport: &dyn Transport,
    cloud: &CloudEndpoints,
    config: &TransportConfig,
    email: &str,
    password: &SecretString,
) -> Result<SecretString, Error> {
    let url = cloud.auth_endpoint(ACCOUNT_LOGIN_PATH)?;
    let body = json!({
        "user": {
            "email": email,
            "pwd": password.expose_secret(),
            "remember": 1,
        }
    });
    let (resp, _): (AccountLoginResponse, _) =
        exchange(transport, post(url, body, config)).await?;
    debug!("cloud account login successful");
    Ok(SecretString::from(resp.access_token))
}

/// List the controllers registered to a cloud account.
pub(crate) async fn list_sprinklers(
    transport: &dyn Transport,
    cloud: &CloudEndpoints,
    config: &TransportConfig,
    account_token: &SecretString,
) -> Result<Vec<Sprinkler>, Error> {
    let url = cloud.auth_endpoint(SPRINKLERS_PATH)?;
    let body = json!({ "token": account_token.expose_secret() });
    let (list, _): (SprinklerList, _) = exchange(transport, post(url, body, config)).await?;
    debug!(count = list.sprinklers.len(), "fetched cloud sprinkler list");
    Ok(list.sprinklers)
}

impl AuthSession {
    fn from_login(resp: LoginResponse, cookies: Cookies) -> Self {
        let expires_at = resp.expires_in.and_then(|secs| expiry_from_now(Utc::now(), secs));
        Self::new(SecretString::from(resp.access_token), expires_at, cookies)
    }
}

fn expiry_from_now(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}

impl Session {
    /// Run the full login handshake for this controller's mode.
    pub(crate) async fn handshake(&self) -> Result<AuthSession, Error> {
        match self.credentials() {
            Credentials::Local { password } => self.local_login(password).await,
            Credentials::Remote { email, password } => {
                let account_token = account_login(
                    self.transport(),
                    self.cloud(),
                    self.transport_config(),
                    email,
                    password,
                )
                .await?;
                self.sprinkler_login(&account_token).await
            }
        }
    }

    /// `POST auth/login` with `{"pwd", "remember": true}`.
    async fn local_login(&self, password: &SecretString) -> Result<AuthSession, Error> {
        let url = self.endpoint(LOCAL_LOGIN_PATH)?;
        debug!("logging in at {url}");

        let body = json!({
            "pwd": password.expose_secret(),
            "remember": true,
        });
        let mut request = post(url, body, self.transport_config());
        request.verify_tls = self.verify_tls();

        let (resp, cookies): (LoginResponse, _) = exchange(self.transport(), request).await?;
        Ok(AuthSession::from_login(resp, cookies))
    }

    /// Exchange an account token for a controller token via the cloud.
    pub(crate) async fn sprinkler_login(
        &self,
        account_token: &SecretString,
    ) -> Result<AuthSession, Error> {
        let (Location::Remote { sprinkler_id }, Credentials::Remote { password, .. }) =
            (self.location(), self.credentials())
        else {
            return Err(Error::UnknownApiCall {
                message: "sprinkler login is only available on the remote API".into(),
            });
        };

        let url = self.cloud().auth_endpoint(SPRINKLER_LOGIN_PATH)?;
        debug!(%sprinkler_id, "logging in to sprinkler via cloud");

        let body = json!({
            "sprinklerId": sprinkler_id,
            "pwd": password.expose_secret(),
        });
        let mut request = post(url, body, self.transport_config());
        request.query.push((
            "access_token".into(),
            account_token.expose_secret().to_owned(),
        ));

        let (resp, cookies): (LoginResponse, _) = exchange(self.transport(), request).await?;
        Ok(AuthSession::from_login(resp, cookies))
    }
}
