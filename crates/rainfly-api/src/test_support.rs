// In-memory transport for exercising session behavior without a socket.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::auth::{CloudEndpoints, Credentials, Location};
use crate::controller::Controller;
use crate::error::Error;
use crate::models::{ApiVersions, DeviceInfo};
use crate::session::Session;
use crate::transport::{RawRequest, RawResponse, Transport, TransportConfig};

pub(crate) const LOGIN: &str = "/api/4/auth/login";

type Handler = dyn Fn(&RawRequest) -> Result<RawResponse, Error> + Send + Sync;

/// Answers every request through a closure and records what was sent.
///
/// Responses are ready immediately, except for the path given to
/// [`delayed`](Self::delayed), which sleeps before answering.
pub(crate) struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<RawRequest>>,
    delay: Option<(&'static str, Duration)>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&RawRequest) -> Result<RawResponse, Error> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Like [`new`](Self::new), but requests to `path` take `delay`.
    pub(crate) fn delayed(
        path: &'static str,
        delay: Duration,
        handler: impl Fn(&RawRequest) -> Result<RawResponse, Error> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: Some((path, delay)),
        })
    }

    pub(crate) fn requests(&self) -> Vec<RawRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent to `path`.
    pub(crate) fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: RawRequest) -> BoxFuture<'_, Result<RawResponse, Error>> {
        let delay = self
            .delay
            .filter(|(path, _)| request.url.path() == *path)
            .map(|(_, delay)| delay);
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        match delay {
            Some(delay) => async move {
                tokio::time::sleep(delay).await;
                result
            }
            .boxed(),
            None => futures_util::future::ready(result).boxed(),
        }
    }
}

pub(crate) fn respond(request: &RawRequest, status: u16, body: &Value) -> RawResponse {
    RawResponse {
        status,
        url: request.url.to_string(),
        body: body.to_string(),
        ..RawResponse::default()
    }
}

/// Local login that hands out `token-1`, `token-2`, ... on each call.
pub(crate) fn issue_tokens(counter: &AtomicUsize, request: &RawRequest) -> RawResponse {
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    respond(
        request,
        200,
        &json!({ "access_token": format!("token-{n}"), "expires_in": 157_680_000, "statusCode": 0 }),
    )
}

/// The `access_token` query parameter a request carried.
pub(crate) fn token_of(request: &RawRequest) -> Option<String> {
    request
        .query
        .iter()
        .find(|(k, _)| k == "access_token")
        .map(|(_, v)| v.clone())
}

fn info() -> DeviceInfo {
    DeviceInfo::new(
        "ab:cd:ef:12:34:56".into(),
        "My House".into(),
        ApiVersions {
            api_version: "4.5.0".into(),
            hardware_version: "3".into(),
            software_version: "4.0.925".into(),
        },
    )
}

/// A local controller, already logged in through `transport`.
pub(crate) async fn local_controller(transport: Arc<ScriptedTransport>) -> Controller {
    let session = Session::new(
        Location::Local {
            host: "controller.test".into(),
            port: 8080,
            use_ssl: true,
        },
        Credentials::Local {
            password: "my_password".to_owned().into(),
        },
        transport,
        TransportConfig::default(),
        CloudEndpoints::default(),
    )
    .unwrap();
    session.login().await.unwrap();
    Controller::new(session, info())
}

/// A remote controller that has never logged in.
pub(crate) fn remote_controller(transport: Arc<ScriptedTransport>) -> Controller {
    let session = Session::new(
        Location::Remote {
            sprinkler_id: "12345abcde".into(),
        },
        Credentials::Remote {
            email: "user@host.com".into(),
            password: "my_password".to_owned().into(),
        },
        transport,
        TransportConfig::default(),
        CloudEndpoints::default(),
    )
    .unwrap();
    Controller::new(session, info())
}
