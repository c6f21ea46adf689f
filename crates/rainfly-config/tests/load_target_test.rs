#![allow(clippy::unwrap_used)]
// Loading controllers through a config profile, against wiremock.

use std::collections::HashMap;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rainfly_api::Client;
use rainfly_config::{Config, Defaults, Profile, ProfileMode, resolve_profile};

async fn mount(server: &MockServer, verb: &str, route: &str, body: serde_json::Value) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_local_profile_loads_controller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/4/auth/login"))
        .and(body_json(json!({ "pwd": "the_password_123", "remember": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "12345abcde",
            "expires_in": 157_680_000
        })))
        .mount(&server)
        .await;
    mount(
        &server,
        "GET",
        "/api/4/provision/wifi",
        json!({ "macAddress": "ab:cd:ef:12:34:56" }),
    )
    .await;
    mount(&server, "GET", "/api/4/provision/name", json!({ "name": "My House" })).await;
    mount(
        &server,
        "GET",
        "/api/4/apiVer",
        json!({ "apiVer": "4.5.0", "hwVer": 3, "swVer": "4.0.925" }),
    )
    .await;

    let addr = server.address();
    let profile = Profile {
        mode: ProfileMode::Local,
        host: Some(addr.ip().to_string()),
        port: Some(addr.port()),
        use_ssl: Some(false),
        password: Some("the_password_123".into()),
        password_env: Some("RAINFLY_TEST_LOCAL_PROFILE_PASSWORD".into()),
        ..Profile::default()
    };
    let config = Config {
        default_profile: Some("garden".into()),
        defaults: Defaults::default(),
        profiles: HashMap::from([("garden".to_owned(), profile)]),
    };

    let (client_config, target) = resolve_profile(&config, None).unwrap();
    let client = Client::new(client_config).unwrap();
    let controllers = target.load(&client).await.unwrap();

    assert_eq!(controllers.len(), 1);
    assert_eq!(controllers[0].mac(), "ab:cd:ef:12:34:56");
    assert_eq!(controllers[0].software_version(), "4.0.925");
    assert_eq!(client.len(), 1);
}

#[tokio::test]
async fn test_remote_profile_uses_overridden_cloud() {
    let server = MockServer::start().await;
    mount(
        &server,
        "POST",
        "/login/auth",
        json!({ "access_token": "account-token", "errorType": 0 }),
    )
    .await;
    mount(
        &server,
        "POST",
        "/devices/get-sprinklers",
        json!({ "sprinklers": [], "errorType": 0 }),
    )
    .await;

    let profile = Profile {
        mode: ProfileMode::Remote,
        email: Some("user@host.com".into()),
        password: Some("pw".into()),
        password_env: Some("RAINFLY_TEST_REMOTE_PROFILE_PASSWORD".into()),
        cloud_url: Some(server.uri()),
        proxy_url: Some(server.uri()),
        ..Profile::default()
    };
    let config = Config {
        default_profile: None,
        defaults: Defaults::default(),
        profiles: HashMap::from([("cloud".to_owned(), profile)]),
    };

    let (client_config, target) = resolve_profile(&config, Some("cloud")).unwrap();
    let client = Client::new(client_config).unwrap();
    let controllers = target.load(&client).await.unwrap();

    assert!(controllers.is_empty());
    assert!(client.is_empty());
}
