use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use onay_cli::commands::{config, doctor, migrate, seed, stages};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&database_env(&dir), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        let again = parse_payload(&migrate::run().output);
        assert_eq!(again["message"], "schema already up to date");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut vars = database_env(&dir);
    vars.push(("ONAY_WORKFLOW_MAX_DECIDE_ATTEMPTS".to_string(), "0".to_string()));

    with_env(&vars, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_every_demo_entity() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&database_env(&dir), || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - budget_proposal: BT-2026-0001 in `vp_review`"));
        assert!(message.contains("  - activity_report: FR-2026-0001 in `unit_review`"));
        assert!(message.contains("  - bpm_process: SR-2026-0001 in `in_effect`"));
        assert!(message.contains("  - internal_control_decision: IK-2026-0001 in `control_review`"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&database_env(&dir), || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");
        assert_eq!(second_payload["message"], "demo dataset already present (5 entities)");
    });
}

#[test]
fn doctor_flags_missing_migrations_then_passes() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&database_env(&dir), || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "schema_migrations"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "doctor should pass: {}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(check_status(&report, "stage_definitions"), "pass");
    });
}

#[test]
fn config_lists_env_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&database_env(&dir), || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("(source: env (ONAY_DATABASE_URL))"));
        assert!(result.output.contains("- workflow.definitions_path = <builtin catalogue>"));
        assert!(result.output.contains("- workflow.max_decide_attempts = 3 (source: default)"));
    });
}

#[test]
fn stages_validates_a_definitions_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let valid = dir.path().join("stages.toml");
    std::fs::write(
        &valid,
        r#"
[[workflow]]
type = "procurement_request"
approved_status = "ordered"

[[workflow.stage]]
role = "unit_manager"
pending_status = "unit_review"
on_reject = "revision_loop"
scoped = true

[[workflow.stage]]
role = "purchasing"
pending_status = "purchasing_review"
rejected_status = "purchasing_rejected"
"#,
    )
    .expect("write definitions");
    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "[[workflow]]\ntype = 42\n").expect("write broken definitions");

    with_env(&database_env(&dir), || {
        let result = stages::run(Some(&valid), false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("procurement_request"));
        assert!(result.output.contains("approve -> `ordered`"));

        let result = stages::run(Some(&broken), false);
        assert_eq!(result.exit_code, 7);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "stage_definitions");

        let result = stages::run(None, true);
        assert_eq!(result.exit_code, 0);
        let definitions = parse_payload(&result.output);
        assert_eq!(definitions.as_array().map(Vec::len), Some(4));
    });
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn database_env(dir: &TempDir) -> Vec<(String, String)> {
    vec![("ONAY_DATABASE_URL".to_string(), sqlite_url(&dir.path().join("onay.db")))]
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(String, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner());

    let keys = [
        "ONAY_DATABASE_URL",
        "ONAY_DATABASE_MAX_CONNECTIONS",
        "ONAY_DATABASE_TIMEOUT_SECS",
        "ONAY_SERVER_BIND_ADDRESS",
        "ONAY_SERVER_PORT",
        "ONAY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ONAY_WORKFLOW_DEFINITIONS_PATH",
        "ONAY_WORKFLOW_MAX_DECIDE_ATTEMPTS",
        "ONAY_LOG_LEVEL",
        "ONAY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
