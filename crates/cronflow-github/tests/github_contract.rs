//! GitHub client contract tests.
//!
//! Each test stands up a `wiremock` server in place of api.github.com and
//! checks request shape, response parsing, and error mapping.

use cronflow_core::config::GitHubConfig;
use cronflow_core::error::CronflowError;
use cronflow_github::{GitHubClient, RunStatus, WorkflowState};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GitHubClient {
    let config = GitHubConfig {
        api_base: server.uri(),
        token: "ghp_test".into(),
        timeout_secs: 5,
        ..GitHubConfig::default()
    };
    GitHubClient::new(&config).unwrap()
}

fn workflow_body(state: &str) -> serde_json::Value {
    json!({
        "id": 161335,
        "name": "Build",
        "path": ".github/workflows/build.yml",
        "state": state,
        "html_url": "https://github.com/acme/app/blob/main/.github/workflows/build.yml"
    })
}

async fn mount_workflow(server: &MockServer, state: &str) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(workflow_body(state)))
        .mount(server)
        .await;
}

async fn mount_runs(server: &MockServer, runs: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml/runs"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(runs))
        .mount(server)
        .await;
}

// ────────────────────────────────────────────────────────────────────────────
// request()
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(workflow_body("active")))
        .expect(1)
        .mount(&server)
        .await;

    let info = client_for(&server)
        .get_workflow_info("acme/app", "build.yml")
        .await
        .unwrap();
    assert_eq!(info.id, 161335);
    assert_eq!(info.workflow_state(), WorkflowState::Active);
}

#[tokio::test]
async fn test_request_maps_non_2xx_to_remote_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate-limited"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "API rate limit exceeded"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .request(reqwest::Method::GET, "/rate-limited", None)
        .await
        .unwrap_err();
    match err {
        CronflowError::RemoteApi { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "API rate limit exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_request_204_yields_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nothing"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let value = client_for(&server)
        .request(reqwest::Method::POST, "/nothing", None)
        .await
        .unwrap();
    assert!(value.is_null());
}

// ────────────────────────────────────────────────────────────────────────────
// Mutating calls
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_trigger_uses_final_path_segment_and_ref() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/app/actions/workflows/build.yml/dispatches"))
        .and(body_json(json!({ "ref": "release" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .trigger_workflow("acme/app", ".github/workflows/build.yml", "release")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_trigger_propagates_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/app/actions/workflows/build.yml/dispatches"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "No ref found for: nope"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .trigger_workflow("acme/app", "build.yml", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, CronflowError::RemoteApi { status: 422, .. }));
}

#[tokio::test]
async fn test_cancel_accepts_202() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/app/actions/runs/30433642/cancel"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .cancel_workflow("acme/app", 30433642)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_propagates_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/app/actions/runs/1/cancel"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Cannot cancel a workflow run that is completed."
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .cancel_workflow("acme/app", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CronflowError::RemoteApi { status: 409, .. }));
}

// ────────────────────────────────────────────────────────────────────────────
// Repo info
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repo_info_collects_branches_and_workflows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "main", "protected": true},
            {"name": "release"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "workflows": [
                {"id": 1, "name": "Build", "path": ".github/workflows/build.yml"},
                {"id": 2, "name": "Deploy", "path": ".github/workflows/deploy.yml"}
            ]
        })))
        .mount(&server)
        .await;

    let info = client_for(&server).get_repo_info("acme/app").await.unwrap();
    assert_eq!(info.branches, vec!["main", "release"]);
    assert_eq!(info.workflows.len(), 2);
    assert_eq!(info.workflows[1].name, "Deploy");
    assert_eq!(info.workflows[1].path, ".github/workflows/deploy.yml");
}

#[tokio::test]
async fn test_repo_info_follows_pages() {
    let server = MockServer::start().await;
    let first: Vec<_> = (0..100).map(|i| json!({"name": format!("feature-{i}")})).collect();
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/branches"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(first)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/branches"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "main"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "workflows": [{"id": 1, "name": "Build", "path": ".github/workflows/build.yml"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client_for(&server).get_repo_info("acme/app").await.unwrap();
    assert_eq!(info.branches.len(), 101);
    assert_eq!(info.branches[0], "feature-0");
    assert_eq!(info.branches[100], "main");
    assert_eq!(info.workflows.len(), 1);
}

#[tokio::test]
async fn test_repo_info_rejects_unexpected_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "main"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 0})))
        .mount(&server)
        .await;

    let err = client_for(&server).get_repo_info("acme/app").await.unwrap_err();
    assert!(matches!(err, CronflowError::BadRequest(_)));
}

// ────────────────────────────────────────────────────────────────────────────
// Status probe
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_success() {
    let server = MockServer::start().await;
    mount_workflow(&server, "active").await;
    mount_runs(
        &server,
        json!({
            "total_count": 1,
            "workflow_runs": [{
                "id": 30433642,
                "status": "completed",
                "conclusion": "success",
                "created_at": "2026-02-22T02:00:05Z",
                "html_url": "https://github.com/acme/app/actions/runs/30433642"
            }]
        }),
    )
    .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::Success);
    assert_eq!(status.run_id, Some(30433642));
    assert_eq!(
        status.last_run.map(|t| t.to_rfc3339()),
        Some("2026-02-22T02:00:05+00:00".to_string())
    );
}

#[tokio::test]
async fn test_status_not_found_does_not_raise() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/missing.yml"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "missing.yml")
        .await;
    assert_eq!(status.status, RunStatus::NotFound);
    assert!(status.run_id.is_none());
    assert!(status.last_run.is_none());
}

#[tokio::test]
async fn test_status_disabled_skips_runs_query() {
    let server = MockServer::start().await;
    mount_workflow(&server, "disabled_manually").await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"workflow_runs": []})))
        .expect(0)
        .mount(&server)
        .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::Disabled);
}

#[tokio::test]
async fn test_status_never_run() {
    let server = MockServer::start().await;
    mount_workflow(&server, "active").await;
    mount_runs(&server, json!({"total_count": 0, "workflow_runs": []})).await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::NeverRun);
}

#[tokio::test]
async fn test_status_running_and_passthrough() {
    let server = MockServer::start().await;
    mount_workflow(&server, "active").await;
    mount_runs(
        &server,
        json!({"workflow_runs": [{
            "id": 5, "status": "in_progress", "conclusion": null,
            "created_at": "2026-02-22T02:00:05Z"
        }]}),
    )
    .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::Running);
    assert_eq!(status.run_id, Some(5));
}

#[tokio::test]
async fn test_status_other_conclusion_uppercased() {
    let server = MockServer::start().await;
    mount_workflow(&server, "active").await;
    mount_runs(
        &server,
        json!({"workflow_runs": [{
            "id": 6, "status": "completed", "conclusion": "timed_out",
            "created_at": "2026-02-22T02:00:05Z"
        }]}),
    )
    .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::Other("TIMED_OUT".into()));
    assert_eq!(status.status.as_str(), "TIMED_OUT");
}

#[tokio::test]
async fn test_status_upstream_failure_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::ApiError);
    assert!(status.message.unwrap().contains("500"));
}

#[tokio::test]
async fn test_status_runs_failure_becomes_api_error() {
    let server = MockServer::start().await;
    mount_workflow(&server, "active").await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/actions/workflows/build.yml/runs"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let status = client_for(&server)
        .get_workflow_status("acme/app", "build.yml")
        .await;
    assert_eq!(status.status, RunStatus::ApiError);
}

#[tokio::test]
async fn test_status_unreachable_host_becomes_api_error() {
    let config = GitHubConfig {
        api_base: "http://127.0.0.1:9".into(),
        timeout_secs: 2,
        ..GitHubConfig::default()
    };
    let client = GitHubClient::new(&config).unwrap();

    let status = client.get_workflow_status("acme/app", "build.yml").await;
    assert_eq!(status.status, RunStatus::ApiError);
    assert!(status.message.is_some());
}
