//! Integration tests for authorization pre-checks using wiremock

use std::time::Duration;

use autoclaim::auth::{AuthError, AuthVerifier, Authorization};
use autoclaim::client::{BeduClient, Session};
use autoclaim::config::{AuthConfig, AuthMode};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RECORD_PATH: &str = "/api/collections/baidu_edu_users/records/alice";

fn verifier() -> AuthVerifier {
    AuthVerifier::new(Duration::from_secs(5)).unwrap()
}

fn license(exp_time: &str) -> serde_json::Value {
    json!({
        "id": "alice",
        "collectionId": "pbc_1",
        "collectionName": "baidu_edu_users",
        "created": "2024-01-01 00:00:00.000Z",
        "updated": "2024-01-01 00:00:00.000Z",
        "name": "Alice",
        "exp_time": exp_time,
        "remark": "",
        "limit": 100,
        "xufei_type": "monthly",
        "coze": false
    })
}

async fn mount_user_info(server: &MockServer, user_name: &str) {
    Mock::given(method("GET"))
        .and(path("/edushop/user/common/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errno": 0,
            "errmsg": "success",
            "data": {"userName": user_name, "roleNames": [], "roleLinks": [], "avatar": ""}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_official_license_valid() {
    let registry = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(license("2099-01-01 00:00:00.000Z")))
        .expect(1)
        .mount(&registry)
        .await;

    let record = verifier()
        .verify_official("alice", &[registry.uri()])
        .await
        .unwrap();

    assert_eq!(record.name, "Alice");
    assert_eq!(record.limit, 100);
}

#[tokio::test]
async fn test_official_unknown_user_stops_search() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&primary)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(license("2099-01-01 00:00:00.000Z")))
        .expect(0)
        .mount(&backup)
        .await;

    let err = verifier()
        .verify_official("alice", &[primary.uri(), backup.uri()])
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UnknownUser));
}

#[tokio::test]
async fn test_official_falls_back_to_backup() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;

    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(license("2099-01-01 00:00:00.000Z")))
        .expect(1)
        .mount(&backup)
        .await;

    let record = verifier()
        .verify_official("alice", &[primary.uri(), backup.uri()])
        .await
        .unwrap();

    assert_eq!(record.id, "alice");
}

#[tokio::test]
async fn test_official_all_servers_fail() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&backup)
        .await;

    let err = verifier()
        .verify_official("alice", &[primary.uri(), backup.uri()])
        .await
        .unwrap_err();

    // The last server's failure is reported
    assert!(matches!(err, AuthError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_official_expired_license() {
    let registry = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(license("2020-01-01 00:00:00.000Z")))
        .mount(&registry)
        .await;

    let err = verifier()
        .verify_official("alice", &[registry.uri()])
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Expired { .. }));
}

#[tokio::test]
async fn test_custom_authorization_accepted() {
    let server = MockServer::start().await;
    mount_user_info(&server, "张三").await;

    Mock::given(method("GET"))
        .and(path("/check"))
        .and(header("authorization", "%E5%BC%A0%E4%B8%89"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = BeduClient::new(Duration::from_secs(5)).unwrap();
    let session = Session::new(server.uri(), "BDUSS=abc");
    let endpoint = format!("{}/check", server.uri());

    let user = verifier()
        .verify_custom(&api, &session, &endpoint)
        .await
        .unwrap();

    assert_eq!(user, "张三");
}

#[tokio::test]
async fn test_custom_authorization_rejected() {
    let server = MockServer::start().await;
    mount_user_info(&server, "bob").await;

    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let api = BeduClient::new(Duration::from_secs(5)).unwrap();
    let session = Session::new(server.uri(), "BDUSS=abc");
    let endpoint = format!("{}/check", server.uri());

    let err = verifier()
        .verify_custom(&api, &session, &endpoint)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn test_custom_requires_user_name() {
    let server = MockServer::start().await;
    mount_user_info(&server, "").await;

    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "ok"})))
        .expect(0)
        .mount(&server)
        .await;

    let api = BeduClient::new(Duration::from_secs(5)).unwrap();
    let session = Session::new(server.uri(), "BDUSS=abc");
    let endpoint = format!("{}/check", server.uri());

    let err = verifier()
        .verify_custom(&api, &session, &endpoint)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn test_verify_dispatches_on_mode() {
    let api = BeduClient::new(Duration::from_secs(5)).unwrap();
    let session = Session::new("http://127.0.0.1:9", "BDUSS=abc");

    let config = AuthConfig::default();
    assert_eq!(config.mode, AuthMode::None);
    let result = verifier().verify(&config, &api, &session).await.unwrap();
    assert_eq!(result, Authorization::Skipped);

    let config = AuthConfig {
        mode: AuthMode::Official,
        ..Default::default()
    };
    let err = verifier().verify(&config, &api, &session).await.unwrap_err();
    assert!(matches!(err, AuthError::UsernameRequired));
}
