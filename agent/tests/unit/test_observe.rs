//! Logs, running units and host health

use app_deployer::deploy::command::CommandOutcome;
use app_deployer::errors::ErrorKind;

use crate::support::{deployer, FakeRunner, MemFs};

fn journal(lines: usize) -> String {
    (1..=lines)
        .map(|i| format!("Oct 19 10:00:{:02} host web-api[812]: request {}", i % 60, i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_logs_clamps_requested_lines() {
    let runner = FakeRunner::new();
    let deployer = deployer(runner.clone(), MemFs::new());

    let logs = deployer.logs("web-api", Some(50_000)).await.unwrap();
    assert_eq!(logs.lines_requested, 10_000);
    let call = runner.last_call("journalctl").unwrap();
    assert_eq!(
        call.args,
        vec!["-u", "web-api", "-n", "10000", "--no-pager"]
    );

    let logs = deployer.logs("web-api", Some(0)).await.unwrap();
    assert_eq!(logs.lines_requested, 1);

    let logs = deployer.logs("web-api", None).await.unwrap();
    assert_eq!(logs.lines_requested, 100);
    assert_eq!(logs.service, "web-api");
}

#[tokio::test]
async fn test_logs_trimmed_to_request() {
    let runner = FakeRunner::new();
    runner.on("journalctl", CommandOutcome::exited(0, journal(8), ""));
    let deployer = deployer(runner, MemFs::new());

    let logs = deployer.logs("web-api", Some(3)).await.unwrap();
    assert_eq!(logs.lines_returned, 3);
    assert!(logs.logs.ends_with("request 8"));
    assert!(!logs.logs.contains("request 5"));
}

#[tokio::test]
async fn test_logs_command_failures() {
    let runner = FakeRunner::new();
    runner.on(
        "journalctl",
        CommandOutcome::exited(1, "", "Failed to open journal: Permission denied\n"),
    );
    let deployer_a = deployer(runner, MemFs::new());
    let err = deployer_a.logs("web-api", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert!(err.to_string().contains("Permission denied"));

    let runner = FakeRunner::new();
    runner.on("journalctl", CommandOutcome::timed_out("", ""));
    let deployer_b = deployer(runner, MemFs::new());
    let err = deployer_b.logs("web-api", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let err = deployer_b.logs("ghost", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_running_services() {
    let runner = FakeRunner::new();
    runner.on(
        "systemctl list-units",
        CommandOutcome::exited(
            0,
            "nginx.service loaded active running A high performance web server\n\
             web-api.service loaded active running Web API\n",
            "",
        ),
    );
    let deployer = deployer(runner, MemFs::new());

    let running = deployer.running_services().await.unwrap();
    assert_eq!(running.services, vec!["nginx.service", "web-api.service"]);
    assert!(running.raw_output.contains("Web API"));
}

#[tokio::test]
async fn test_health_summary_is_best_effort() {
    let runner = FakeRunner::new();
    runner.on(
        "uptime",
        CommandOutcome::exited(0, " 10:00:00 up 3 days, load average: 0.10, 0.20, 0.30\n", ""),
    );
    runner.on("free", CommandOutcome::exited(127, "", "free: command not found\n"));
    let deployer = deployer(runner.clone(), MemFs::new());

    let health = deployer.health_summary().await.unwrap();
    assert!(health.load_average.contains("load average"));
    assert!(health.memory.starts_with("unavailable:"));
    assert!(runner.ran("df -h"));
    assert!(runner.ran("vmstat 1 2"));
    assert!(health.metrics.memory_total > 0);
}
