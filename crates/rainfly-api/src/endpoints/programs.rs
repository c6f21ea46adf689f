// Watering programs

use serde_json::{Value, json};
use tracing::debug;

use crate::controller::Controller;
use crate::error::Error;
use crate::models::{take_field, take_list};
use crate::session::ApiCall;

/// Status value the controller reports for a program that is watering.
const RUNNING: u64 = 1;

/// Watering programs of one controller.
#[derive(Debug, Clone)]
pub struct Programs {
    controller: Controller,
}

impl Programs {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// All programs; inactive ones only when `include_inactive` is set.
    pub async fn all(&self, include_inactive: bool) -> Result<Vec<Value>, Error> {
        let programs = self
            .controller
            .call_with(&ApiCall::get("program"), |data| take_list(data, "programs"))
            .await?;
        Ok(programs
            .into_iter()
            .filter(|p| include_inactive || is_active(p))
            .collect())
    }

    pub async fn get(&self, program_id: u64) -> Result<Value, Error> {
        self.controller
            .call(&ApiCall::get(format!("program/{program_id}")))
            .await
    }

    pub async fn enable(&self, program_id: u64) -> Result<Value, Error> {
        self.set_active(program_id, true).await
    }

    pub async fn disable(&self, program_id: u64) -> Result<Value, Error> {
        self.set_active(program_id, false).await
    }

    async fn set_active(&self, program_id: u64, active: bool) -> Result<Value, Error> {
        debug!(program_id, active, "updating program");
        self.controller
            .call(&ApiCall::post(
                format!("program/{program_id}"),
                json!({ "active": active }),
            ))
            .await
    }

    pub async fn start(&self, program_id: u64) -> Result<Value, Error> {
        debug!(program_id, "starting program");
        self.controller
            .call(&ApiCall::post(
                format!("program/{program_id}/start"),
                json!({ "pid": program_id }),
            ))
            .await
    }

    pub async fn stop(&self, program_id: u64) -> Result<Value, Error> {
        debug!(program_id, "stopping program");
        self.controller
            .call(&ApiCall::post(
                format!("program/{program_id}/stop"),
                json!({ "pid": program_id }),
            ))
            .await
    }

    /// Next scheduled run of each program.
    pub async fn next(&self) -> Result<Value, Error> {
        self.controller
            .call_with(&ApiCall::get("program/nextrun"), |data| {
                take_field(data, "nextRuns")
            })
            .await
    }

    /// Programs currently watering.
    pub async fn running(&self) -> Result<Vec<Value>, Error> {
        let programs = self
            .controller
            .call_with(&ApiCall::get("watering/program"), |data| {
                take_list(data, "programs")
            })
            .await?;
        Ok(programs
            .into_iter()
            .filter(|p| p.get("status").and_then(Value::as_u64) == Some(RUNNING))
            .collect())
    }
}

/// Programs without an `active` flag count as active.
fn is_active(program: &Value) -> bool {
    program
        .get("active")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}
