// Watering activity: logs, queue, past runs, and global stop/pause.

use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::debug;

use crate::controller::Controller;
use crate::error::Error;
use crate::models::take_field;
use crate::session::ApiCall;

/// Watering activity for one controller.
#[derive(Debug, Clone)]
pub struct Watering {
    controller: Controller,
}

/// Append `/{YYYY-MM-DD}/{days}` when both bounds are given.
fn with_range(path: &str, range: Option<(NaiveDate, u32)>) -> String {
    match range {
        Some((date, days)) => format!("{path}/{}/{days}", date.format("%Y-%m-%d")),
        None => path.to_owned(),
    }
}

impl Watering {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// Watering log, per day, optionally for `days` days starting at a date.
    ///
    /// `GET watering/log[/details][/{date}/{days}]`. The detailed log is
    /// not available through the remote API.
    pub async fn log(
        &self,
        range: Option<(NaiveDate, u32)>,
        details: bool,
    ) -> Result<Value, Error> {
        let call = if details {
            ApiCall::get(with_range("watering/log/details", range)).local_only("watering.log")
        } else {
            ApiCall::get(with_range("watering/log", range))
        };
        self.controller
            .call_with(&call, |data| take_field(take_field(data, "waterLog")?, "days"))
            .await
    }

    /// Active and pending watering activities.
    pub async fn queue(&self) -> Result<Value, Error> {
        self.controller
            .call_with(&ApiCall::get("watering/queue"), |data| take_field(data, "queue"))
            .await
    }

    /// Program runs, optionally for `days` days starting at a date.
    ///
    /// `GET watering/past[/{date}/{days}]`
    pub async fn runs(&self, range: Option<(NaiveDate, u32)>) -> Result<Value, Error> {
        self.controller
            .call_with(&ApiCall::get(with_range("watering/past", range)), |data| {
                take_field(data, "pastValues")
            })
            .await
    }

    /// Stop every running program and zone.
    pub async fn stop_all(&self) -> Result<Value, Error> {
        debug!("stopping all watering");
        self.controller
            .call(&ApiCall::post("watering/stopall", json!({})))
            .await
    }

    /// Pause all watering for `seconds`.
    pub async fn pause_all(&self, seconds: u32) -> Result<Value, Error> {
        debug!(seconds, "pausing all watering");
        self.controller
            .call(&ApiCall::post(
                "watering/pauseall",
                json!({ "duration": seconds }),
            ))
            .await
    }

    /// Resume watering after [`pause_all`](Self::pause_all).
    pub async fn unpause_all(&self) -> Result<Value, Error> {
        self.pause_all(0).await
    }
}
