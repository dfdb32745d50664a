use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn condo(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("condo").unwrap();
    cmd.current_dir(dir.path()).env("CONDO_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    condo(dir).arg("init").assert().success();
}

/// Run with `--json` and parse stdout.
fn json(dir: &TempDir, args: &[&str]) -> Value {
    let output = condo(dir).arg("--json").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "condo {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Condo plus a goal with T1 and T2 (T2 after T1). Returns (condo id, goal id).
fn seed(dir: &TempDir) -> (String, String) {
    let condo_id = json(dir, &["condo", "create", "Website"])["id"]
        .as_str()
        .unwrap()
        .to_string();
    let goal_id = json(dir, &["goal", "create", "--condo", &condo_id, "Launch", "site"])["id"]
        .as_str()
        .unwrap()
        .to_string();
    json(dir, &["task", "add", &goal_id, "Write", "copy"]);
    json(dir, &["task", "add", &goal_id, "Publish", "--after", "T1"]);
    (condo_id, goal_id)
}

// ---------------------------------------------------------------------------
// condo init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_condo_dir() {
    let dir = TempDir::new().unwrap();
    condo(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .condo/config.yaml"));

    assert!(dir.path().join(".condo").is_dir());
    assert!(dir.path().join(".condo/config.yaml").exists());
    assert!(dir.path().join(".condo/store.json").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    condo(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .condo/store.json"));
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    condo(&dir)
        .args(["condo", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("condo init"));
}

// ---------------------------------------------------------------------------
// planning
// ---------------------------------------------------------------------------

#[test]
fn tasks_are_listed_with_eligibility() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (_, goal_id) = seed(&dir);

    condo(&dir)
        .args(["task", "list", &goal_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending (eligible)"))
        .stdout(predicate::str::contains("Publish"));

    let eligible = json(&dir, &["task", "eligible", &goal_id]);
    assert_eq!(eligible, serde_json::json!(["T1"]));

    condo(&dir)
        .args(["task", "eligible", &goal_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("T1\n"))
        .stdout(predicate::str::contains("T2 waits on T1"));
}

#[test]
fn goal_list_shows_progress() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (condo_id, _) = seed(&dir);

    condo(&dir)
        .args(["goal", "list", "--condo", &condo_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("0/2 done"))
        .stdout(predicate::str::contains("Launch site"));
}

#[test]
fn invalid_autonomy_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (condo_id, _) = seed(&dir);
    condo(&dir)
        .args(["goal", "create", "--condo", &condo_id, "--autonomy", "yolo", "X"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid autonomy mode"));
}

// ---------------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------------

#[test]
fn kickoff_then_done_cascades() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (_, goal_id) = seed(&dir);

    let report = json(&dir, &["goal", "kickoff", &goal_id]);
    let spawned = report["spawnedSessions"].as_array().unwrap();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0]["taskId"], "T1");

    // A second kickoff has nothing left to claim.
    let again = json(&dir, &["goal", "kickoff", &goal_id]);
    assert!(again["spawnedSessions"].as_array().unwrap().is_empty());

    condo(&dir)
        .args(["task", "done", &goal_id, "T1", "--summary", "copy written"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now done"))
        .stdout(predicate::str::contains("cascade: started"))
        .stdout(predicate::str::contains("T2"));

    let goal = json(&dir, &["goal", "show", &goal_id]);
    assert_eq!(goal["tasks"][0]["status"], "done");
    assert_eq!(goal["tasks"][1]["status"], "in-progress");
}

#[test]
fn session_end_retries_then_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (_, goal_id) = seed(&dir);
    json(&dir, &["goal", "kickoff", &goal_id]);

    let first = json(&dir, &["session", "ended", "--goal", &goal_id, "--task", "T1", "--failed"]);
    assert_eq!(first["decision"]["decision"], "retried");
    // The retry is kicked off by the settled cascade.
    assert_eq!(
        first["cascades"][0]["kickoff"]["spawnedSessions"][0]["taskId"],
        "T1"
    );

    let second = json(&dir, &["session", "ended", "--goal", &goal_id, "--task", "T1", "--failed"]);
    assert_eq!(second["decision"]["decision"], "failed");

    let goal = json(&dir, &["goal", "show", &goal_id]);
    assert_eq!(goal["tasks"][0]["status"], "failed");
    assert_eq!(goal["tasks"][0]["retryCount"], 1);
}

#[test]
fn kill_resets_without_respawning() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (condo_id, goal_id) = seed(&dir);
    json(&dir, &["goal", "kickoff", &goal_id]);

    condo(&dir)
        .args(["session", "kill", "--condo", &condo_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Killed"));

    let goal = json(&dir, &["goal", "show", &goal_id]);
    assert_eq!(goal["tasks"][0]["status"], "pending");
    assert_eq!(goal["tasks"][0]["retryCount"], 0);
    assert!(goal["tasks"][0].get("sessionKey").map_or(true, Value::is_null));
}

#[test]
fn failed_task_can_be_reset_by_hand() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let (_, goal_id) = seed(&dir);
    json(&dir, &["goal", "kickoff", &goal_id]);
    json(&dir, &["session", "ended", "--goal", &goal_id, "--task", "T1"]);
    json(&dir, &["session", "ended", "--goal", &goal_id, "--task", "T1"]);

    condo(&dir)
        .args(["task", "done", &goal_id, "T1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transition"));

    let reset = json(&dir, &["task", "update", &goal_id, "T1", "pending"]);
    assert_eq!(reset["update"]["changed"], true);
    assert_eq!(json(&dir, &["task", "eligible", &goal_id]), serde_json::json!(["T1"]));
}

#[test]
fn unknown_goal_is_an_error() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    condo(&dir)
        .args(["goal", "kickoff", "goal_missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("goal not found"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_passes_on_fresh_project() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    condo(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config OK"));
}
