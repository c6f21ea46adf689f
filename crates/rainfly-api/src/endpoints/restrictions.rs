use serde_json::Value;

use crate::controller::Controller;
use crate::error::Error;
use crate::models::take_field;
use crate::session::ApiCall;

/// Watering restrictions: rain delays, freeze protection, hourly rules.
#[derive(Debug, Clone)]
pub struct Restrictions {
    controller: Controller,
}

impl Restrictions {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// Restrictions active right now.
    pub async fn current(&self) -> Result<Value, Error> {
        self.controller
            .call(&ApiCall::get("restrictions/currently"))
            .await
    }

    /// Restrictions active over the next hour.
    pub async fn hourly(&self) -> Result<Value, Error> {
        self.controller
            .call_with(&ApiCall::get("restrictions/hourly"), |data| {
                take_field(data, "hourlyRestrictions")
            })
            .await
    }

    pub async fn raindelay(&self) -> Result<Value, Error> {
        self.controller
            .call(&ApiCall::get("restrictions/raindelay"))
            .await
    }

    /// Global (always active) restrictions.
    pub async fn universal(&self) -> Result<Value, Error> {
        self.controller
            .call(&ApiCall::get("restrictions/global"))
            .await
    }
}
