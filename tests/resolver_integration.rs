//! Integration tests for the identity resolver.
//!
//! These tests run the resolver against a mock directory service over real
//! HTTP and verify request shapes, paging, allocation write-back and status
//! mapping end to end.

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cloudid_nss::config::AppConfig;
use cloudid_nss::directory::create_directory;
use cloudid_nss::domain::{AllocationRange, LookupStatus, ResolvedGroup};
use cloudid_nss::service::{CallerPrivilege, IdentityResolver};

const TOKEN: &str = "test-token";
const USER_SELECT: &str = "id,displayName,userPrincipalName,uidNumber,gidNumber";
const GROUP_SELECT: &str = "id,displayName,gidNumber";
const LICENSED: &str = "assignedLicenses/$count ne 0";
const SECURITY: &str = "securityEnabled eq true";

// ============================================================================
// Test Harness
// ============================================================================

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.directory.base_url = server.uri();
    config.directory.access_token = Some(TOKEN.to_string());
    config.users.domain_template = "{}@example.com".to_string();
    config.users.uid_range = AllocationRange::new(10_000, 10_005);
    config.resolver.settle_delay_ms = 0;
    config
}

fn resolver(config: AppConfig, privilege: CallerPrivilege) -> IdentityResolver {
    let directory = create_directory(&config.directory, 1_000).expect("directory client");
    IdentityResolver::new(Arc::new(config), directory, privilege)
}

fn page(records: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "value": records }))
}

fn odata_error(status: u16, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "code": code, "message": "mock failure" }
    }))
}

// ============================================================================
// passwd
// ============================================================================

#[tokio::test]
async fn test_passwd_enumeration_allocates_and_writes_back() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", LICENSED))
        .and(query_param("$count", "true"))
        .and(query_param("$select", USER_SELECT))
        .and(header("authorization", "Bearer test-token"))
        .and(header("ConsistencyLevel", "eventual"))
        .respond_with(page(json!([
            {
                "id": "u1",
                "displayName": "Alice",
                "userPrincipalName": "alice@example.com",
                "uidNumber": 2001
            },
            {
                "id": "u2",
                "displayName": "Bob",
                "userPrincipalName": "bob@example.com"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$select", "id,uidNumber,gidNumber"))
        .respond_with(page(json!([
            { "id": "u0", "uidNumber": 10_000 },
            { "id": "u1", "uidNumber": 2001 },
            { "id": "u2" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/users/u2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Elevated);
    let result = resolver.passwd_all().await;

    assert_eq!(result.status, LookupStatus::Success);
    assert_eq!(result.data.len(), 2);
    assert_eq!(
        result.data[0].to_passwd_line(),
        "alice:x:2001:100:Alice:/home/alice:/bin/bash"
    );

    let bob = &result.data[1];
    assert_eq!(bob.username, "bob");
    assert!((10_001..=10_005).contains(&bob.uid));

    let requests = server.received_requests().await.expect("recording enabled");
    let patch = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .expect("write-back request");
    let body: Value = serde_json::from_slice(&patch.body).expect("json body");
    assert_eq!(body, json!({ "uidNumber": bob.uid }));
}

#[tokio::test]
async fn test_passwd_enumeration_follows_next_link() {
    let server = MockServer::start().await;
    let next = format!("{}/v1.0/users?$skiptoken=page2", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$select", USER_SELECT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "u1", "userPrincipalName": "alice@example.com", "uidNumber": 10_001 }
            ],
            "@odata.nextLink": next
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(page(json!([
            { "id": "u2", "userPrincipalName": "bob@example.com", "uidNumber": 10_002 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Unprivileged);
    let result = resolver.passwd_all().await;

    assert_eq!(result.status, LookupStatus::Success);
    let names: Vec<_> = result.data.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_passwd_by_name_status_mapping() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/alice@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "displayName": "Alice",
            "userPrincipalName": "alice@example.com",
            "uidNumber": "10004",
            "gidNumber": 500
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/ghost@example.com"))
        .respond_with(odata_error(404, "Request_ResourceNotFound"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/busy@example.com"))
        .respond_with(odata_error(503, "serviceNotAvailable"))
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Unprivileged);

    let alice = resolver.passwd_by_name("alice").await;
    assert_eq!(alice.status, LookupStatus::Success);
    assert_eq!(alice.data.uid, 10_004);
    assert_eq!(alice.data.gid, 500);

    let ghost = resolver.passwd_by_name("ghost").await;
    assert_eq!(ghost.status, LookupStatus::NotFound);
    assert!(ghost.data.username.is_empty());

    assert_eq!(
        resolver.passwd_by_name("busy").await.status,
        LookupStatus::Unavailable
    );
}

#[tokio::test]
async fn test_passwd_by_uid_filters_on_attribute() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "uidNumber eq 10003"))
        .and(query_param("$count", "true"))
        .respond_with(page(json!([
            { "id": "u3", "displayName": "Carol", "userPrincipalName": "carol@example.com" }
        ])))
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Unprivileged);
    let carol = resolver.passwd_by_uid(10_003).await;

    assert_eq!(carol.status, LookupStatus::Success);
    assert_eq!(carol.data.username, "carol");
    assert_eq!(carol.data.uid, 10_003);
}

#[tokio::test]
async fn test_missing_credential_is_unavailable() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.directory.access_token = Some(String::new());

    let resolver = resolver(config, CallerPrivilege::Elevated);
    let result = resolver.passwd_all().await;

    assert_eq!(result.status, LookupStatus::Unavailable);
    assert!(
        server
            .received_requests()
            .await
            .expect("recording enabled")
            .is_empty()
    );
}

// ============================================================================
// group
// ============================================================================

#[tokio::test]
async fn test_group_by_gid_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .and(query_param("$filter", format!("gidNumber eq 4242 and {SECURITY}")))
        .and(query_param("$expand", "members($select=id,userPrincipalName)"))
        .respond_with(page(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Elevated);
    let result = resolver.group_by_gid(4242).await;

    assert_eq!(result.status, LookupStatus::NotFound);
    assert_eq!(result.data, ResolvedGroup::default());
}

#[tokio::test]
async fn test_group_by_name_searches_then_expands() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .and(query_param("$search", "\"displayName:ops\""))
        .respond_with(page(json!([
            { "id": "g1", "displayName": "ops-oncall" },
            { "id": "g2", "displayName": "ops" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/g2"))
        .and(query_param("$select", GROUP_SELECT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g2",
            "displayName": "ops",
            "gidNumber": 20_002,
            "members": [
                { "id": "u1", "userPrincipalName": "alice@example.com" },
                { "id": "sp1" },
                { "id": "u2", "userPrincipalName": "bob@example.com" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Unprivileged);
    let ops = resolver.group_by_name("ops").await;

    assert_eq!(ops.status, LookupStatus::Success);
    assert_eq!(ops.data.to_group_line(), "ops:x:20002:alice,bob");
}

#[tokio::test]
async fn test_group_gid_allocation_uses_custom_attribute_set() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.groups.storage =
        cloudid_nss::domain::IdentityAttributeMode::custom("posix", "uidNumber", "gidNumber");
    config.groups.auto_allocate = true;
    config.groups.gid_range = AllocationRange::new(30_000, 30_000);

    Mock::given(method("GET"))
        .and(path("/beta/groups"))
        .and(query_param("$select", "id,displayName,customSecurityAttributes"))
        .respond_with(page(json!([
            { "id": "g7", "displayName": "analysts", "members": [] }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/beta/groups"))
        .and(query_param("$select", "id,customSecurityAttributes"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/beta/groups/g7"))
        .and(body_json(json!({
            "customSecurityAttributes": {
                "posix": {
                    "@odata.type": "#microsoft.graph.customSecurityAttributeValue",
                    "gidNumber@odata.type": "#Int32",
                    "gidNumber": 30_000
                }
            }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(config, CallerPrivilege::Elevated);
    let result = resolver.group_all().await;

    assert_eq!(result.status, LookupStatus::Success);
    assert_eq!(result.data[0].to_group_line(), "analysts:x:30000:");
}

// ============================================================================
// shadow
// ============================================================================

#[tokio::test]
async fn test_shadow_by_name_reports_change_day() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/alice@example.com"))
        .and(query_param(
            "$select",
            "id,userPrincipalName,lastPasswordChangeDateTime",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "userPrincipalName": "alice@example.com",
            "lastPasswordChangeDateTime": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let resolver = resolver(config_for(&server), CallerPrivilege::Unprivileged);
    let shadow = resolver.shadow_by_name("alice").await;

    assert_eq!(shadow.status, LookupStatus::Success);
    assert_eq!(shadow.data.last_change_day, Some(19_723));
    assert_eq!(shadow.data.to_shadow_line(), "alice:*:19723:0:99999:7::99999:");
}
