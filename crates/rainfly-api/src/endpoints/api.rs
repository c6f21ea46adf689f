use crate::controller::Controller;
use crate::error::Error;
use crate::models::{ApiVersions, from_value};
use crate::session::ApiCall;

pub(crate) const VERSIONS_PATH: &str = "apiVer";

/// API and firmware version information.
#[derive(Debug, Clone)]
pub struct Api {
    controller: Controller,
}

impl Api {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// `GET apiVer`
    pub async fn versions(&self) -> Result<ApiVersions, Error> {
        self.controller
            .call_with(&ApiCall::get(VERSIONS_PATH), from_value)
            .await
    }
}
