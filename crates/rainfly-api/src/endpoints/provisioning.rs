// Provisioning endpoints: device name, network, and general settings.

use serde_json::Value;
use tracing::debug;

use crate::controller::Controller;
use crate::error::Error;
use crate::models::{ProvisionName, from_value};
use crate::session::ApiCall;

pub(crate) const NAME_PATH: &str = "provision/name";
pub(crate) const WIFI_PATH: &str = "provision/wifi";
const SETTINGS_PATH: &str = "provision";

/// Provisioning data for one controller.
#[derive(Debug, Clone)]
pub struct Provisioning {
    controller: Controller,
}

impl Provisioning {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// The name the controller reports for itself, coerced to text.
    ///
    /// `GET provision/name`
    pub async fn device_name(&self) -> Result<String, Error> {
        let name: ProvisionName = self
            .controller
            .call_with(&ApiCall::get(NAME_PATH), from_value)
            .await?;
        Ok(name.name)
    }

    /// Network configuration (MAC, SSID, addresses).
    ///
    /// `GET provision/wifi`. Not available through the remote API.
    pub async fn wifi(&self) -> Result<Value, Error> {
        debug!("fetching wifi provisioning");
        self.controller
            .call(&ApiCall::get(WIFI_PATH).local_only("provisioning.wifi"))
            .await
    }

    /// System and location settings.
    ///
    /// `GET provision`
    pub async fn settings(&self) -> Result<Value, Error> {
        self.controller.call(&ApiCall::get(SETTINGS_PATH)).await
    }
}
