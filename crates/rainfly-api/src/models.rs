// Wire shapes for the login handshakes and the identity endpoints.
//
// Feature endpoints return loosely-typed JSON (the field set varies by
// firmware); only the payloads the session layer depends on are typed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;

/// `POST auth/login` (local) and `POST devices/login-sprinkler` (remote).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginResponse {
    pub access_token: String,
    /// Token lifetime in seconds. The cloud omits it for sprinkler tokens.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// `POST login/auth` on the cloud account endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccountLoginResponse {
    pub access_token: String,
}

/// `POST devices/get-sprinklers`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SprinklerList {
    #[serde(default)]
    pub sprinklers: Vec<Sprinkler>,
}

/// One controller registered to a cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sprinkler {
    #[serde(rename = "sprinklerId")]
    pub sprinkler_id: String,
    pub mac: String,
    #[serde(deserialize_with = "text")]
    pub name: String,
}

/// `GET provision/wifi` (only the field identity needs).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProvisionWifi {
    #[serde(rename = "macAddress")]
    pub mac_address: String,
}

/// `GET provision/name`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProvisionName {
    #[serde(deserialize_with = "text")]
    pub name: String,
}

/// `GET apiVer`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiVersions {
    #[serde(rename = "apiVer", deserialize_with = "text")]
    pub api_version: String,
    #[serde(rename = "hwVer", deserialize_with = "text")]
    pub hardware_version: String,
    #[serde(rename = "swVer", deserialize_with = "text")]
    pub software_version: String,
}

/// Immutable identity of a physical controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub mac: String,
    pub name: String,
    pub hardware_version: String,
    pub software_version: String,
    pub api_version: String,
}

impl DeviceInfo {
    pub(crate) fn new(mac: String, name: String, versions: ApiVersions) -> Self {
        Self {
            mac,
            name,
            hardware_version: versions.hardware_version,
            software_version: versions.software_version,
            api_version: versions.api_version,
        }
    }
}

/// Controllers report some text fields as numbers (a device named `89`
/// comes back as `89`, hardware versions as `3`). Coerce them to text.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Num(serde_json::Number),
        Bool(bool),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::Str(s) => s,
        Text::Num(n) => n.to_string(),
        Text::Bool(b) => b.to_string(),
    })
}

/// Deserialize a response payload, reporting shape mismatches as malformed
/// responses rather than API errors.
pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    T::deserialize(&value).map_err(|e| Error::malformed("", e.to_string(), value.to_string()))
}

/// Move a top-level field out of a response body.
pub(crate) fn take_field(mut value: Value, field: &str) -> Result<Value, Error> {
    value
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| Error::missing_field(field))
}

/// Move a top-level array field out of a response body.
pub(crate) fn take_list(value: Value, field: &str) -> Result<Vec<Value>, Error> {
    match take_field(value, field)? {
        Value::Array(items) => Ok(items),
        other => Err(Error::malformed(
            "",
            format!("expected `{field}` to be an array"),
            other.to_string(),
        )),
    }
}
