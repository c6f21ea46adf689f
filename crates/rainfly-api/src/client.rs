// Controller registry and login orchestration
//
// `Client` performs the local and remote login handshakes, discovers the
// identity of each controller, and keeps one `Controller` per MAC address.

use std::sync::Arc;

use dashmap::DashMap;
use secrecy::SecretString;
use tracing::{debug, info};

use crate::auth::{CloudEndpoints, Credentials, Location};
use crate::controller::Controller;
use crate::endpoints::api::VERSIONS_PATH;
use crate::endpoints::provisioning::{NAME_PATH, WIFI_PATH};
use crate::error::Error;
use crate::login::{account_login, list_sprinklers};
use crate::models::{ApiVersions, DeviceInfo, ProvisionName, ProvisionWifi, from_value};
use crate::session::{ApiCall, Session};
use crate::transport::{HttpTransport, Transport, TransportConfig};

/// Settings shared by every controller a [`Client`] loads.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub cloud: CloudEndpoints,
}

/// Registry of loaded controllers, keyed by MAC address.
///
/// Loading a controller that is already registered returns the existing
/// handle; identity is decided by MAC, never by host or port, since one
/// device can be reachable at several addresses.
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    controllers: DashMap<String, Controller>,
}

impl Client {
    /// Create a client backed by [`HttpTransport`].
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new(&config.transport)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client with a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config,
            controllers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ── Registry ─────────────────────────────────────────────────────

    /// Snapshot of all loaded controllers (unordered).
    pub fn controllers(&self) -> Vec<Controller> {
        self.controllers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Look up a loaded controller by MAC address.
    pub fn controller(&self, mac: &str) -> Option<Controller> {
        self.controllers.get(mac).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    fn session(&self, location: Location, credentials: Credentials) -> Result<Session, Error> {
        Session::new(
            location,
            credentials,
            Arc::clone(&self.transport),
            self.config.transport.clone(),
            self.config.cloud.clone(),
        )
    }

    // ── Loading ──────────────────────────────────────────────────────

    /// Log in to a controller on the LAN and register it.
    ///
    /// If a controller with the same MAC is already registered, the new
    /// session is discarded and the existing handle returned unchanged.
    pub async fn load_local(
        &self,
        host: &str,
        password: &SecretString,
        port: u16,
        use_ssl: bool,
    ) -> Result<Controller, Error> {
        let location = Location::Local {
            host: host.to_owned(),
            port,
            use_ssl,
        };
        let session = self.session(
            location,
            Credentials::Local {
                password: password.clone(),
            },
        )?;
        session.login().await?;

        let wifi: ProvisionWifi = session.call_with(&ApiCall::get(WIFI_PATH), from_value).await?;
        if let Some(existing) = self.controller(&wifi.mac_address) {
            debug!(mac = %wifi.mac_address, "controller already loaded, keeping existing session");
            return Ok(existing);
        }

        let name: ProvisionName = session.call_with(&ApiCall::get(NAME_PATH), from_value).await?;
        let versions: ApiVersions = session
            .call_with(&ApiCall::get(VERSIONS_PATH), from_value)
            .await?;

        let info = DeviceInfo::new(wifi.mac_address, name.name, versions);
        let mac = info.mac.clone();
        let controller = Controller::new(session, info);

        // A concurrent load of the same device may have won the race.
        let registered = self.controllers.entry(mac).or_insert(controller).clone();
        info!(mac = %registered.mac(), name = %registered.name(), "loaded local controller");
        Ok(registered)
    }

    /// Log in to the cloud account and load every controller registered
    /// to it.
    ///
    /// With `reuse`, controllers already in the registry are returned as-is
    /// instead of being logged in again.
    pub async fn load_remote(
        &self,
        email: &str,
        password: &SecretString,
        reuse: bool,
    ) -> Result<Vec<Controller>, Error> {
        let transport = self.transport.as_ref();
        let cloud = &self.config.cloud;
        let config = &self.config.transport;

        let account_token = account_login(transport, cloud, config, email, password).await?;
        let sprinklers = list_sprinklers(transport, cloud, config, &account_token).await?;

        let mut loaded = Vec::with_capacity(sprinklers.len());
        for sprinkler in sprinklers {
            let existing = if reuse {
                self.controller(&sprinkler.mac)
            } else {
                None
            };
            if let Some(existing) = existing {
                debug!(mac = %sprinkler.mac, "reusing loaded remote controller");
                loaded.push(existing);
                continue;
            }

            let session = self.session(
                Location::Remote {
                    sprinkler_id: sprinkler.sprinkler_id,
                },
                Credentials::Remote {
                    email: email.to_owned(),
                    password: password.clone(),
                },
            )?;
            let auth = session.sprinkler_login(&account_token).await?;
            session.install(auth);

            let versions: ApiVersions = session
                .call_with(&ApiCall::get(VERSIONS_PATH), from_value)
                .await?;

            let info = DeviceInfo::new(sprinkler.mac, sprinkler.name, versions);
            let controller = Controller::new(session, info);
            self.controllers
                .insert(controller.mac().to_owned(), controller.clone());
            info!(mac = %controller.mac(), name = %controller.name(), "loaded remote controller");
            loaded.push(controller);
        }

        Ok(loaded)
    }
}
