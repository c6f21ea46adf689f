// rainfly-api: Async Rust client for RainMachine-style irrigation controllers (local + remote API)

pub mod auth;
pub mod client;
pub mod controller;
pub mod endpoints;
pub mod error;
mod login;
pub mod models;
pub mod response;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth::{
    API_PREFIX, ApiMode, CloudEndpoints, DEFAULT_CLOUD_URL, DEFAULT_LOCAL_PORT, DEFAULT_PROXY_URL,
    Location,
};
pub use client::{Client, ClientConfig};
pub use controller::Controller;
pub use endpoints::{Api, Programs, Provisioning, Restrictions, Watering, Zones};
pub use error::Error;
pub use models::{ApiVersions, DeviceInfo, Sprinkler};
pub use response::{ErrorClass, ErrorDescriptor, NormalizedResponse, normalize};
pub use session::{ApiCall, SessionState};
pub use transport::{
    Cookies, HttpTransport, Method, RawRequest, RawResponse, TlsMode, Transport, TransportConfig,
};
