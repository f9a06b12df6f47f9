//! HTTP surface: routing, envelopes and status codes

use std::sync::Arc;
use std::time::Duration;

use app_deployer::deploy::command::CommandOutcome;
use app_deployer::deploy::{Deployer, DeployerOptions};
use app_deployer::server::serve::router;
use app_deployer::server::state::ServerState;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::support::{deployer, deployer_with, web_api, FakeRunner, MemFs};

fn app(deployer: Arc<Deployer>) -> Router {
    router(Arc::new(ServerState::new(deployer)))
}

async fn send(app: Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, "").await
}

async fn post(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::POST, uri, "").await
}

#[tokio::test]
async fn test_health_and_root() {
    let app = app(deployer(FakeRunner::new(), MemFs::new()));

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "app-deployer");

    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_configuration_lists_applications() {
    let app = app(deployer(FakeRunner::new(), MemFs::new()));

    let (status, body) = get(app, "/api/v1/configuration").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["web-api", "worker"]);
}

#[tokio::test]
async fn test_lookup_errors_map_to_status_codes() {
    let runner = FakeRunner::new();
    let app = app(deployer(runner.clone(), MemFs::new()));

    let (status, body) = post(app.clone(), "/api/v1/build/application/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "NotFound");

    let (status, body) = post(app, "/api/v1/application/restart/bad.name").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidName");

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_stage_failure_is_ok_response() {
    let runner = FakeRunner::new();
    runner.on("make build", CommandOutcome::exited(2, "", "make: *** [build] Error 2\n"));
    let fs = MemFs::new();
    fs.add_dir(web_api().workspace_path);
    let app = app(deployer(runner, fs));

    let (status, body) = post(app, "/api/v1/build/application/web-api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["stage"], "build");
    assert_eq!(body["data"]["exit_code"], 2);
    assert_eq!(body["data"]["error"], "ExecutionFailed");
    assert_eq!(body["data"]["stderr"], "make: *** [build] Error 2\n");
}

#[tokio::test]
async fn test_busy_is_conflict() {
    let runner = FakeRunner::new();
    runner.set_delay(Duration::from_millis(300));
    let options = DeployerOptions {
        lock_wait: Duration::ZERO,
        ..Default::default()
    };
    let deployer = deployer_with(runner, MemFs::new(), options);

    let holder = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.restart("web-api").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = post(app(deployer), "/api/v1/deployment/deploy/web-api").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "Busy");
    holder.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_status_endpoint() {
    let runner = FakeRunner::new();
    runner.on(
        "systemctl show worker",
        CommandOutcome::exited(0, "LoadState=not-found\nActiveState=inactive\n", ""),
    );
    runner.on(
        "systemctl show",
        CommandOutcome::exited(0, "LoadState=loaded\nActiveState=inactive\nSubState=dead\n", ""),
    );
    let app = app(deployer(runner, MemFs::new()));

    let (status, body) = get(app.clone(), "/api/v1/application/status/web-api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);
    assert_eq!(body["data"]["state"], "stopped");

    let (status, body) = get(app, "/api/v1/application/status/worker").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "ServiceNotFound");
}

#[tokio::test]
async fn test_logs_query_is_clamped() {
    let runner = FakeRunner::new();
    runner.on("journalctl", CommandOutcome::exited(0, "one\ntwo\n", ""));
    let app = app(deployer(runner.clone(), MemFs::new()));

    let (status, body) = get(app.clone(), "/api/v1/application/logs/web-api?lines=50000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lines_requested"], 10000);
    assert_eq!(body["data"]["lines_returned"], 2);
    assert!(runner.ran("journalctl -u web-api -n 10000"));

    // Past u32::MAX still clamps rather than failing query parsing
    for lines in ["5000000000", "18446744073709551615"] {
        let uri = format!("/api/v1/application/logs/web-api?lines={}", lines);
        let (status, body) = get(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK, "lines={}", lines);
        assert_eq!(body["data"]["lines_requested"], 10000);
    }

    let (_, body) = get(app, "/api/v1/application/logs/web-api").await;
    assert_eq!(body["data"]["lines_requested"], 100);
}

#[tokio::test]
async fn test_rollback_body_handling() {
    let spec = web_api();
    let fs = MemFs::new();
    fs.write(&spec.deploy_path, b"v2");
    fs.write(spec.deploy_path.with_file_name("app.bin.2026-10-01T08:00:00.000000Z.bak"), b"v1");
    let app = app(deployer(FakeRunner::new(), fs.clone()));

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/v1/deployment/rollback/web-api",
        "{not json",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "BadRequest");

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/v1/deployment/rollback/web-api",
        r#"{"backup": "app.bin.1999-01-01T00:00:00Z.bak"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["error"], "ArtifactMissing");

    // Empty body restores the newest backup
    let (status, body) = post(app, "/api/v1/deployment/rollback/web-api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(fs.read(&spec.deploy_path).unwrap(), b"v1");
}

#[tokio::test]
async fn test_full_deploy_endpoint() {
    let app = app(deployer(FakeRunner::new(), MemFs::new()));

    // Clone "succeeds" but leaves no workspace, so the build stage fails.
    let (status, body) = post(app, "/api/v1/deployment/workflow/full-deploy/web-api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["failed_at"], "build");
    assert_eq!(body["data"]["stages"][0]["success"], true);
}
