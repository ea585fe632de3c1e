//! PortainerSource against a mocked Portainer API.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use salvage_core::Secret;
use salvage_source::{PortainerSource, SourceError, StackSource};
use salvage_test_utils::{always, body_json, header, unused_local_url, MockApi};

fn source(api: &MockApi) -> PortainerSource {
    PortainerSource::new(
        api.uri(),
        "admin",
        Secret::new("hunter2"),
        Duration::from_secs(5),
    )
}

fn ok_json(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

fn mount_auth(api: &MockApi, jwt: &str) {
    api.mount(
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ok_json(json!({ "jwt": jwt }))),
    );
}

fn mount_get(api: &MockApi, route: &str, response: ResponseTemplate) {
    api.mount(Mock::given(method("GET")).and(path(route)).respond_with(response));
}

fn portainer_ok() -> MockApi {
    let api = MockApi::start();
    mount_auth(&api, "token-1");
    mount_get(
        &api,
        "/api/stacks",
        ok_json(json!([
            { "Id": 1, "Name": "web", "CreationDate": 1700000000, "CreatedBy": "admin",
              "UpdateDate": 0, "UpdatedBy": "" },
            { "Id": 2, "Name": "db", "CreationDate": 1700000000, "CreatedBy": "admin",
              "UpdateDate": 1700000500, "UpdatedBy": "ops" }
        ])),
    );
    mount_get(
        &api,
        "/api/stacks/1/file",
        ok_json(json!({ "StackFileContent": "image: nginx" })),
    );
    mount_get(
        &api,
        "/api/stacks/2/file",
        ok_json(json!({ "StackFileContent": "image: postgres" })),
    );
    api
}

#[test]
fn enumerates_stacks_in_api_order() {
    let api = portainer_ok();
    let stacks = source(&api).stacks().expect("stacks");

    let names: Vec<_> = stacks.iter().map(|s| s.name.to_string()).collect();
    assert_eq!(names, vec!["web", "db"]);
    assert_eq!(stacks[0].content, b"image: nginx".to_vec());
    let db_origin = stacks[1].origin.as_ref().expect("origin");
    assert_eq!(db_origin.updated_by.as_deref(), Some("ops"));
}

#[test]
fn sends_credentials_and_bearer_token() {
    let api = portainer_ok();
    source(&api).stacks().expect("stacks");

    let requests = api.received();
    let auth = &requests[0];
    assert_eq!(auth.url.path(), "/api/auth");
    assert_eq!(body_json(auth)["username"], "admin");
    assert_eq!(body_json(auth)["password"], "hunter2");

    assert_eq!(requests.len(), 4);
    for req in &requests[1..] {
        assert_eq!(header(req, "authorization"), Some("Bearer token-1"));
    }
}

#[test]
fn insecure_tls_client_still_talks_plain_http() {
    let api = portainer_ok();
    let src = source(&api).with_insecure_tls().expect("tls config");

    let stacks = src.stacks().expect("stacks");
    assert_eq!(stacks.len(), 2);
}

#[test]
fn rejected_credentials_are_auth_errors() {
    let api = always(
        ResponseTemplate::new(422).set_body_json(json!({ "message": "Invalid credentials" })),
    );
    let err = source(&api).stacks().unwrap_err();
    assert!(err.is_auth(), "got: {err}");
}

#[test]
fn missing_jwt_is_decode_error() {
    let api = always(ok_json(json!({})));
    let err = source(&api).stacks().unwrap_err();
    assert!(matches!(err, SourceError::Decode { .. }), "got: {err}");
}

#[test]
fn empty_stack_list_is_fatal() {
    let api = MockApi::start();
    mount_auth(&api, "t");
    mount_get(&api, "/api/stacks", ok_json(json!([])));

    let err = source(&api).stacks().unwrap_err();
    assert!(matches!(err, SourceError::Empty { .. }), "got: {err}");
}

#[test]
fn failing_file_fetch_aborts_whole_enumeration() {
    let api = MockApi::start();
    mount_auth(&api, "t");
    mount_get(
        &api,
        "/api/stacks",
        ok_json(json!([{ "Id": 1, "Name": "web" }, { "Id": 2, "Name": "db" }])),
    );
    mount_get(
        &api,
        "/api/stacks/1/file",
        ok_json(json!({ "StackFileContent": "a" })),
    );
    mount_get(
        &api,
        "/api/stacks/2/file",
        ResponseTemplate::new(500).set_body_string("boom"),
    );

    let err = source(&api).stacks().unwrap_err();
    assert!(
        matches!(err, SourceError::Api { status: 500, .. }),
        "got: {err}"
    );
}

#[test]
fn unreachable_host_is_network_error() {
    let src = PortainerSource::new(
        unused_local_url(),
        "admin",
        Secret::new("pw"),
        Duration::from_secs(2),
    );
    let err = src.stacks().unwrap_err();
    assert!(matches!(err, SourceError::Network { .. }), "got: {err}");
}
