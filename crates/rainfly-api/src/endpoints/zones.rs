// Zone endpoints
//
// Zone listings come in two halves: `zone` carries runtime state,
// `zone/properties` carries configuration. With `details` both are fetched
// concurrently and merged per zone, properties winning on overlap.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::debug;

use crate::controller::Controller;
use crate::error::Error;
use crate::models::take_list;
use crate::session::ApiCall;

/// Irrigation zones of one controller.
#[derive(Debug, Clone)]
pub struct Zones {
    controller: Controller,
}

impl Zones {
    pub(crate) fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// All zones keyed by `uid`.
    ///
    /// Inactive zones are skipped unless `include_inactive` is set. Zones
    /// that do not report `active` count as active.
    pub async fn all(
        &self,
        details: bool,
        include_inactive: bool,
    ) -> Result<BTreeMap<u64, Value>, Error> {
        let zone_list = |body: Value| take_list(body, "zones");
        let state_call = ApiCall::get("zone");
        let (zones, properties) = if details {
            let properties_call = ApiCall::get("zone/properties");
            let (zones, properties) = tokio::try_join!(
                self.controller.call_with(&state_call, zone_list),
                self.controller.call_with(&properties_call, zone_list),
            )?;
            (zones, Some(properties))
        } else {
            (self.controller.call_with(&state_call, zone_list).await?, None)
        };

        collect_zones(zones, properties.as_deref(), include_inactive)
            .map_err(|err| self.controller.attribute(err, "zone"))
    }

    /// One zone, optionally merged with its properties.
    pub async fn get(&self, zone_id: u64, details: bool) -> Result<Value, Error> {
        let state_call = ApiCall::get(format!("zone/{zone_id}"));
        if !details {
            return self.controller.call(&state_call).await;
        }

        let properties_call = ApiCall::get(format!("zone/{zone_id}/properties"));
        let (state, properties) = tokio::try_join!(
            self.controller.call(&state_call),
            self.controller.call(&properties_call),
        )?;
        Ok(merge(state, &properties))
    }

    pub async fn enable(&self, zone_id: u64) -> Result<Value, Error> {
        self.set_active(zone_id, true).await
    }

    pub async fn disable(&self, zone_id: u64) -> Result<Value, Error> {
        self.set_active(zone_id, false).await
    }

    async fn set_active(&self, zone_id: u64, active: bool) -> Result<Value, Error> {
        debug!(zone_id, active, "updating zone");
        self.controller
            .call(&ApiCall::post(
                format!("zone/{zone_id}/properties"),
                json!({ "active": active }),
            ))
            .await
    }

    /// Run a zone for `seconds`.
    ///
    /// First-generation controllers read the zone id from the body, so it
    /// is sent there as well as in the path.
    pub async fn start(&self, zone_id: u64, seconds: u32) -> Result<Value, Error> {
        debug!(zone_id, seconds, "starting zone");
        self.controller
            .call(&ApiCall::post(
                format!("zone/{zone_id}/start"),
                json!({ "time": seconds, "zid": zone_id }),
            ))
            .await
    }

    pub async fn stop(&self, zone_id: u64) -> Result<Value, Error> {
        debug!(zone_id, "stopping zone");
        self.controller
            .call(&ApiCall::post(
                format!("zone/{zone_id}/stop"),
                json!({ "zid": zone_id }),
            ))
            .await
    }
}

fn uid(zone: &Value) -> Result<u64, Error> {
    zone.get("uid")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::missing_field("uid"))
}

/// Overlay the keys of `extra` onto `base`.
fn merge(mut base: Value, extra: &Value) -> Value {
    if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
        for (key, value) in extra_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    base
}

fn collect_zones(
    zones: Vec<Value>,
    properties: Option<&[Value]>,
    include_inactive: bool,
) -> Result<BTreeMap<u64, Value>, Error> {
    let mut by_uid = BTreeMap::new();
    for zone in zones {
        let id = uid(&zone)?;
        let mut zone = match properties {
            Some(properties) => {
                let extra = properties
                    .iter()
                    .find(|p| p.get("uid").and_then(Value::as_u64) == Some(id))
                    .ok_or_else(|| {
                        Error::malformed(
                            "",
                            format!("no properties for zone {id}"),
                            String::new(),
                        )
                    })?;
                merge(zone, extra)
            }
            None => zone,
        };

        if let Some(map) = zone.as_object_mut() {
            map.entry("active").or_insert(Value::Bool(true));
        }
        let active = zone
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if active || include_inactive {
            by_uid.insert(id, zone);
        }
    }
    Ok(by_uid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_active_defaults_to_active() {
        let zones = vec![
            json!({ "uid": 1, "name": "Front" }),
            json!({ "uid": 2, "name": "Back", "active": false }),
        ];
        let all = collect_zones(zones.clone(), None, false).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(all[&1]["active"], json!(true));

        let all = collect_zones(zones, None, true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn details_merge_by_uid() {
        let zones = vec![json!({ "uid": 1, "state": 0 }), json!({ "uid": 2, "state": 1 })];
        let properties = vec![
            json!({ "uid": 2, "active": true, "type": 3 }),
            json!({ "uid": 1, "active": false, "type": 2 }),
        ];
        let all = collect_zones(zones, Some(&properties), false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[&2], json!({ "uid": 2, "state": 1, "active": true, "type": 3 }));
    }

    #[test]
    fn zone_without_uid_is_malformed() {
        let err = collect_zones(vec![json!({ "name": "?" })], None, true).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }
}
