//! Per-application locking through the deployer facade

use std::time::Duration;

use app_deployer::deploy::DeployerOptions;
use app_deployer::errors::ErrorKind;

use crate::support::{active_status, deployer_with, ready_host, web_api, FakeRunner, MemFs};

fn options(lock_wait: Duration) -> DeployerOptions {
    DeployerOptions {
        lock_wait,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_second_mutation_is_busy() {
    let runner = FakeRunner::new();
    runner.set_delay(Duration::from_millis(300));
    let deployer = deployer_with(runner.clone(), MemFs::new(), options(Duration::ZERO));

    let first = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.restart("web-api").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = deployer.build("web-api").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    let err = deployer.full_deploy("web-api").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    assert!(first.await.unwrap().unwrap().success);
    // Rejected calls never reached the runner
    assert_eq!(runner.calls(), vec!["systemctl restart web-api"]);

    // Lock is released once the first call returns
    assert!(deployer.stop("web-api").await.unwrap().success);
}

#[tokio::test]
async fn test_waiting_caller_runs_after_holder() {
    let runner = FakeRunner::new();
    runner.set_delay(Duration::from_millis(100));
    let deployer = deployer_with(runner.clone(), MemFs::new(), options(Duration::from_secs(5)));

    let first = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.restart("web-api").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = deployer.stop("web-api").await.unwrap();
    assert!(second.success);
    assert!(first.await.unwrap().unwrap().success);
    assert_eq!(
        runner.calls(),
        vec!["systemctl restart web-api", "systemctl stop web-api"]
    );
}

#[tokio::test]
async fn test_different_applications_run_in_parallel() {
    let runner = FakeRunner::new();
    runner.set_delay(Duration::from_millis(200));
    let deployer = deployer_with(runner.clone(), MemFs::new(), options(Duration::ZERO));

    let (web, worker) = tokio::join!(deployer.restart("web-api"), deployer.restart("worker"));
    assert!(web.unwrap().success);
    assert!(worker.unwrap().success);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_read_only_operations_ignore_lock() {
    let runner = FakeRunner::new();
    runner.set_delay(Duration::from_millis(200));
    let deployer = deployer_with(runner.clone(), MemFs::new(), options(Duration::ZERO));

    let holder = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.restart("web-api").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (logs, backups, verify) = tokio::join!(
        deployer.logs("web-api", None),
        deployer.backups("web-api"),
        deployer.verify_artifact("web-api"),
    );
    assert!(logs.is_ok());
    assert!(backups.unwrap().is_empty());
    // Missing artifact is a stage failure, not lock contention
    assert_eq!(verify.unwrap().error, Some(ErrorKind::ArtifactMissing));

    assert!(holder.await.unwrap().unwrap().success);
}

#[tokio::test]
async fn test_unknown_application_checked_before_lock() {
    let runner = FakeRunner::new();
    let deployer = deployer_with(runner.clone(), MemFs::new(), options(Duration::ZERO));

    let err = deployer.deploy("ghost").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = deployer.rollback("web api", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidName);
}

#[tokio::test]
async fn test_concurrent_full_deploys_do_not_interleave() {
    let (runner, fs) = ready_host();
    runner.on("systemctl show", active_status());
    runner.set_delay(Duration::from_millis(20));
    let deployer = deployer_with(runner.clone(), fs.clone(), options(Duration::from_secs(10)));

    let first = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.full_deploy("web-api").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = deployer.full_deploy("web-api").await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(first.success);
    assert!(second.success);
    assert_ne!(first.run_id, second.run_id);
    assert!(first.finished_at <= second.started_at);

    // Every command of the first run precedes every command of the second
    let calls = runner.calls();
    let shows: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| c.starts_with("systemctl show"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(shows.len(), 2);
    let (first_run, second_run) = calls.split_at(shows[0] + 1);
    assert_eq!(first_run, second_run);
    assert!(first_run[0].starts_with("git "));
    assert_eq!(fs.read(&web_api().deploy_path).unwrap(), b"v2");
}
