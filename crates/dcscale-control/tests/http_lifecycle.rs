//! End-to-end lifecycle tests against a mock control plane.

use std::sync::Arc;
use std::time::Duration;

use dcscale_auth::{AuthConfig, Credentials, SessionAuthenticator};
use dcscale_control::{
    DrainPolicy, HttpControlPlaneClient, LifecycleConfig, LifecycleHandler, LifecycleOutcome,
    NodeLifecycleController,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN: &str = "/security/public-rest/v1/authentication/login";

type Handler = LifecycleHandler<SessionAuthenticator, HttpControlPlaneClient>;

fn handler(server: &MockServer) -> Handler {
    let authenticator = SessionAuthenticator::new(AuthConfig {
        base_url: server.uri(),
        ..AuthConfig::default()
    })
    .unwrap();
    let client =
        HttpControlPlaneClient::new(server.uri(), "SDC", Duration::from_secs(5)).unwrap();
    let controller = NodeLifecycleController::new(
        Arc::new(client),
        LifecycleConfig {
            organization: "acme".to_string(),
            service_user: "svc@acme".to_string(),
            drain: DrainPolicy {
                interval: Duration::from_millis(50),
                timeout: Duration::from_secs(5),
            },
            dedupe_balance_jobs: true,
        },
    );
    LifecycleHandler::new(
        Arc::new(authenticator),
        Credentials::new("svc@acme", "secret"),
        controller,
    )
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_json(json!({"userName": "svc@acme", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "SS-SSO-LOGIN=session-123; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn ok(server: &MockServer, http_method: &str, endpoint: &str) {
    Mock::given(method(http_method))
        .and(path(endpoint))
        .and(header("X-SS-User-Auth-Token", "session-123"))
        .and(header("X-Requested-By", "SDC"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn request_log(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}

async fn run(handler: &Handler, event: Value) -> Value {
    let outcome: LifecycleOutcome = handler.handle(&event, &CancellationToken::new()).await;
    serde_json::to_value(outcome).unwrap()
}

#[tokio::test]
async fn pre_start_issues_token() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path("/security/rest/v1/organization/acme/components"))
        .and(header("X-SS-User-Auth-Token", "session-123"))
        .and(body_json(json!({
            "organization": "acme",
            "componentType": "dc",
            "numberOfComponents": 1,
            "active": true
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"fullAuthToken": "node-token-xyz"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = run(&handler(&server), json!({"action": "pre-start"})).await;
    assert_eq!(result, json!({"response": "node-token-xyz"}));
}

#[tokio::test]
async fn post_start_labels_and_rebalances() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    ok(&server, "POST", "/jobrunner/rest/v1/sdc/node-1/acl").await;
    ok(&server, "POST", "/jobrunner/rest/v1/sdc/node-1/updateLabels").await;
    Mock::given(method("GET"))
        .and(path("/jobrunner/rest/v1/jobs"))
        .and(query_param("organization", "acme"))
        .and(query_param("jobLabel", "west"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "j1"}, {"id": "j2"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobrunner/rest/v1/jobs"))
        .and(query_param("jobLabel", "batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "j2"}, {"id": "j3"}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobrunner/rest/v1/jobs/balanceJobs"))
        .and(body_json(json!(["j1", "j2", "j3"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(
        &handler(&server),
        json!({
            "action": "post-start",
            "sdcId": "node-1",
            "labels": "west,batch",
            "groups": "ops@acme"
        }),
    )
    .await;
    assert_eq!(result, json!({"response": "Success"}));

    assert_eq!(
        request_log(&server).await,
        vec![
            format!("POST {LOGIN}"),
            "POST /jobrunner/rest/v1/sdc/node-1/acl".to_string(),
            "POST /jobrunner/rest/v1/sdc/node-1/updateLabels".to_string(),
            "GET /jobrunner/rest/v1/jobs".to_string(),
            "GET /jobrunner/rest/v1/jobs".to_string(),
            "POST /jobrunner/rest/v1/jobs/balanceJobs".to_string(),
        ]
    );
}

#[tokio::test]
async fn pre_stop_drains_then_removes_node() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    // Initial listing and the first two drain polls still see j1.
    Mock::given(method("GET"))
        .and(path("/jobrunner/rest/v1/sdc/node-1/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"jobId": "j1", "localPipeline": false},
            {"jobId": "pinned", "localPipeline": true}
        ])))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobrunner/rest/v1/sdc/node-1/pipelines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"jobId": "pinned", "localPipeline": true}])),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobrunner/rest/v1/sdc/node-1/updateLabels"))
        .and(body_json(json!({"id": "node-1", "organization": "acme", "labels": []})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobrunner/rest/v1/jobs/syncJobs"))
        .and(body_json(json!(["j1"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/security/rest/v1/organization/acme/components/deactivate"))
        .and(body_json(json!(["node-1"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/security/rest/v1/organization/acme/components/delete"))
        .and(body_json(json!(["node-1"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/jobrunner/rest/v1/sdc/node-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(
        &handler(&server),
        json!({"action": "pre-stop", "sdcId": "node-1"}),
    )
    .await;
    assert_eq!(result, json!({"response": "Success"}));

    let pipelines = "GET /jobrunner/rest/v1/sdc/node-1/pipelines".to_string();
    assert_eq!(
        request_log(&server).await,
        vec![
            format!("POST {LOGIN}"),
            pipelines.clone(),
            "POST /jobrunner/rest/v1/sdc/node-1/updateLabels".to_string(),
            "POST /jobrunner/rest/v1/jobs/syncJobs".to_string(),
            pipelines.clone(),
            pipelines.clone(),
            pipelines,
            "POST /security/rest/v1/organization/acme/components/deactivate".to_string(),
            "POST /security/rest/v1/organization/acme/components/delete".to_string(),
            "DELETE /jobrunner/rest/v1/sdc/node-1".to_string(),
        ]
    );
}

#[tokio::test]
async fn server_error_stops_pre_stop() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/jobrunner/rest/v1/sdc/node-1/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"jobId": "j1"}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobrunner/rest/v1/sdc/node-1/updateLabels"))
        .respond_with(ResponseTemplate::new(500).set_body_string("label store down"))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(
        &handler(&server),
        json!({"action": "pre-stop", "sdcId": "node-1"}),
    )
    .await;
    assert_eq!(
        result,
        json!({"error": "control plane returned HTTP 500: label store down"})
    );

    let log = request_log(&server).await;
    assert_eq!(log.len(), 3);
    assert!(!log.iter().any(|entry| entry.contains("syncJobs")));
}

#[tokio::test]
async fn rejected_login_makes_no_further_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(&handler(&server), json!({"action": "pre-start"})).await;
    let message = result["error"].as_str().unwrap();
    assert!(message.contains("401"));
    assert_eq!(request_log(&server).await.len(), 1);
}
