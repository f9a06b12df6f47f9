//! Single-stage behavior against scripted commands

use app_deployer::deploy::command::CommandOutcome;
use app_deployer::deploy::stage::{ServiceState, Stage, StageDetails};
use app_deployer::deploy::{artifact, build, git, service};
use app_deployer::errors::{DeployerError, ErrorKind};
use app_deployer::utils::sha256_hash;

use crate::support::{context, seed_built_workspace, web_api, FakeRunner, MemFs};

const ORIGIN: &str = "https://github.com/acme/web-api.git";

fn existing_checkout(runner: &FakeRunner, fs: &MemFs) {
    fs.add_dir(web_api().workspace_path.join(".git"));
    runner.on("git rev-parse --git-dir", CommandOutcome::exited(0, ".git\n", ""));
    runner.on("git remote get-url origin", CommandOutcome::exited(0, format!("{}\n", ORIGIN), ""));
}

// ================================ CHECKOUT ====================================== //

#[tokio::test]
async fn test_checkout_clones_missing_workspace() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    let ctx = context(runner.clone(), fs.clone());

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert!(result.success);
    assert_eq!(result.stage, Stage::Checkout);

    let clone = runner.last_call("git clone").unwrap();
    assert_eq!(
        clone.args,
        vec![
            "clone",
            "--branch",
            "main",
            "--single-branch",
            "--",
            ORIGIN,
            "/var/lib/deployer/workspaces/web-api",
        ]
    );
    assert_eq!(clone.timeout, ctx.timeouts.git);
}

#[tokio::test]
async fn test_checkout_fast_forwards_existing_workspace() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    existing_checkout(&runner, &fs);
    runner.on("git merge", CommandOutcome::exited(0, "Already up to date.\n", ""));
    let ctx = context(runner.clone(), fs.clone());

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert!(result.success, "{:?}", result.message);
    assert!(result.stdout.contains("Already up to date."));

    let calls = runner.calls();
    assert_eq!(
        calls[2..],
        [
            "git fetch origin main",
            "git checkout main",
            "git merge --ff-only FETCH_HEAD",
        ]
    );
    assert!(!runner.ran("git clone"));
    let fetch = runner.last_call("git fetch").unwrap();
    assert_eq!(fetch.cwd.as_deref(), Some(spec.workspace_path.as_path()));
}

#[tokio::test]
async fn test_checkout_refuses_foreign_remote() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    fs.add_dir(spec.workspace_path.clone());
    runner.on("git rev-parse --git-dir", CommandOutcome::exited(0, ".git\n", ""));
    runner.on(
        "git remote get-url origin",
        CommandOutcome::exited(0, "https://github.com/someone/else.git\n", ""),
    );
    let ctx = context(runner.clone(), fs.clone());

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::RepositoryError));
    assert!(!runner.ran("git fetch"));
    assert!(!runner.ran("git clone"));
}

#[tokio::test]
async fn test_checkout_refuses_nested_directory() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    fs.add_dir(spec.workspace_path.clone());
    runner.on("git rev-parse --git-dir", CommandOutcome::exited(0, "/var/lib/.git\n", ""));
    let ctx = context(runner.clone(), fs.clone());

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert_eq!(result.error, Some(ErrorKind::RepositoryError));
    assert!(!runner.ran("git fetch"));
}

#[tokio::test]
async fn test_checkout_diverged_branch_fails() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    existing_checkout(&runner, &fs);
    runner.on(
        "git merge",
        CommandOutcome::exited(128, "", "fatal: Not possible to fast-forward, aborting.\n"),
    );
    let ctx = context(runner, fs);

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::RepositoryError));
    assert_eq!(result.exit_code, Some(128));
    assert!(result.stderr.contains("Not possible to fast-forward"));
}

#[tokio::test]
async fn test_checkout_timeout() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    runner.on("git clone", CommandOutcome::timed_out("", "Cloning into..."));
    let ctx = context(runner, fs);

    let result = git::checkout(&ctx, &spec).await.unwrap();
    assert_eq!(result.error, Some(ErrorKind::Timeout));
}

// ================================= BUILD ======================================== //

#[tokio::test]
async fn test_build_requires_workspace() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    let ctx = context(runner.clone(), fs);

    let result = build::build(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::RepositoryError));
    assert!(result.message.unwrap().contains("run checkout first"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_build_failure_keeps_output_verbatim() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    fs.add_dir(spec.workspace_path.clone());
    runner.on(
        "make build",
        CommandOutcome::exited(2, "cc -o app main.c\n", "main.c:3: error: expected ';'\n"),
    );
    let ctx = context(runner.clone(), fs);

    let result = build::build(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::ExecutionFailed));
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.stdout, "cc -o app main.c\n");
    assert_eq!(result.stderr, "main.c:3: error: expected ';'\n");

    let call = runner.last_call("make").unwrap();
    assert_eq!(call.cwd.as_deref(), Some(spec.workspace_path.as_path()));
    assert_eq!(call.timeout, ctx.timeouts.build);
}

#[tokio::test]
async fn test_build_spawn_failure_is_a_fault() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    fs.add_dir(spec.workspace_path.clone());
    runner.spawn_error("make");
    let ctx = context(runner, fs);

    let err = build::build(&ctx, &spec).await.unwrap_err();
    assert!(matches!(err, DeployerError::SpawnError(_)));
}

// ================================= VERIFY ======================================= //

#[tokio::test]
async fn test_verify_reports_digest() {
    let spec = web_api();
    let (runner, fs) = (FakeRunner::new(), MemFs::new());
    seed_built_workspace(&fs, &spec, b"binary-content");
    let ctx = context(runner, fs);

    let result = artifact::verify(&ctx, &spec).await.unwrap();
    assert!(result.success);
    match result.details {
        Some(StageDetails::Artifact { path, size_bytes, sha256 }) => {
            assert_eq!(path, spec.artifact_location());
            assert_eq!(size_bytes, 14);
            assert_eq!(sha256, sha256_hash(b"binary-content"));
        }
        other => panic!("unexpected details: {:?}", other),
    }
}

#[tokio::test]
async fn test_verify_missing_artifact() {
    let spec = web_api();
    let ctx = context(FakeRunner::new(), MemFs::new());

    let result = artifact::verify(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::ArtifactMissing));
}

// ================================ SERVICE ======================================= //

#[tokio::test]
async fn test_restart_unknown_unit() {
    let spec = web_api();
    let runner = FakeRunner::new();
    runner.on(
        "systemctl restart",
        CommandOutcome::exited(5, "", "Failed to restart web-api.service: Unit web-api.service not found.\n"),
    );
    let ctx = context(runner, MemFs::new());

    let result = service::restart(&ctx, &spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::ServiceNotFound));
}

#[tokio::test]
async fn test_restart_and_stop_succeed() {
    let spec = web_api();
    let runner = FakeRunner::new();
    let ctx = context(runner.clone(), MemFs::new());

    assert!(service::restart(&ctx, &spec).await.unwrap().success);
    let stop = service::stop(&ctx, &spec).await.unwrap();
    assert!(stop.success);
    assert_eq!(stop.stage, Stage::Stop);
    assert_eq!(
        runner.calls(),
        vec!["systemctl restart web-api", "systemctl stop web-api"]
    );
    assert_eq!(
        runner.last_call("systemctl stop").unwrap().timeout,
        ctx.timeouts.service
    );
}

#[tokio::test]
async fn test_status_inactive_and_missing() {
    let spec = web_api();
    let runner = FakeRunner::new();
    runner.on(
        "systemctl show",
        CommandOutcome::exited(0, "LoadState=loaded\nActiveState=inactive\nSubState=dead\n", ""),
    );
    let ctx = context(runner, MemFs::new());
    let status = service::status(&ctx, &spec).await.unwrap();
    assert!(!status.active);
    assert_eq!(status.state, ServiceState::Stopped);

    let runner = FakeRunner::new();
    runner.on(
        "systemctl show",
        CommandOutcome::exited(0, "LoadState=not-found\nActiveState=inactive\nSubState=dead\n", ""),
    );
    let ctx = context(runner, MemFs::new());
    let err = service::status(&ctx, &spec).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceNotFound);
}
