use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

fn kv_withdraw() -> Command {
    let mut cmd = Command::new(cargo_bin!("kv-withdraw"));
    cmd.env_remove("REDIS_URL").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_withdraw_on_fresh_store_is_missing() {
    kv_withdraw()
        .args(["withdraw", "--strategy", "lua", "--user", "123", "--amount", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"missing""#));
}

#[test]
fn test_stateful_command_warns_about_in_memory_store() {
    kv_withdraw()
        .args(["init", "--user", "123", "--balance", "100"])
        .assert()
        .success()
        .stderr(predicate::str::contains("does not persist between runs"))
        .stdout(predicate::str::contains(r#""balance":100"#));

    kv_withdraw()
        .arg("health")
        .assert()
        .success()
        .stderr(predicate::str::contains("does not persist").not());
}

#[test]
fn test_non_positive_amount_is_rejected() {
    kv_withdraw()
        .args(["withdraw", "--user", "123", "--amount", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid amount"));

    kv_withdraw()
        .args(["withdraw", "--user", "123", "--amount", "-4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid amount"));
}

#[test]
fn test_unknown_strategy_is_rejected() {
    kv_withdraw()
        .args(["withdraw", "--strategy", "yolo", "--user", "1", "--amount", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown strategy"));
}

#[test]
fn test_missing_balance_fails() {
    kv_withdraw()
        .args(["balance", "--user", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("balance not found"));
}

#[test]
fn test_health() {
    kv_withdraw()
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"status":"ok","store":"in-memory"}"#,
        ));
}

#[test]
fn test_race_reports_every_strategy() -> Result<(), Box<dyn std::error::Error>> {
    let output = kv_withdraw()
        .args([
            "race",
            "--user",
            "cli",
            "--initial",
            "100",
            "--requests",
            "20",
            "--amount",
            "2",
            "--lock-wait-ms",
            "10000",
            "--lock-retry-ms",
            "1",
            "--max-retries",
            "100",
        ])
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    let reports: Vec<Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    let names: Vec<&str> = reports
        .iter()
        .filter_map(|r| r["strategy"].as_str())
        .collect();
    assert_eq!(names, ["optimistic", "script", "lock", "lock-unsafe"]);

    for report in &reports {
        if report["strategy"] == "script" || report["strategy"] == "lock" {
            assert_eq!(report["statuses"]["ok"], 20);
            assert_eq!(report["finalBalance"], 60);
            assert_eq!(report["historyLen"], 20);
            assert_eq!(report["lostUpdates"], false);
        }
    }
    Ok(())
}

#[test]
fn test_race_single_strategy_with_jitter() {
    kv_withdraw()
        .args([
            "race",
            "--strategy",
            "script",
            "--requests",
            "10",
            "--amount",
            "3",
            "--amount-jitter",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""strategy":"script""#))
        .stdout(predicate::str::contains(r#""lostUpdates":false"#))
        .stdout(predicate::str::contains(r#""requests":10"#));
}

#[cfg(not(feature = "storage-redis"))]
#[test]
fn test_redis_fallback_warning() {
    kv_withdraw()
        .args(["--redis-url", "redis://127.0.0.1:1/0", "health"])
        .assert()
        .success()
        .stderr(predicate::str::contains("'storage-redis' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains(r#""store":"in-memory""#));
}
