use assert_cmd::Command;
use predicates::prelude::*;

fn extx(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("extx"));
    cmd.env("HOME", home);
    for var in [
        "EXTX_TOKEN",
        "EXTX_TOKEN_FILE",
        "EXTX_EMAIL",
        "EXTX_PASSWORD",
        "EXTX_PROXY_URL",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("EXTX_FIXTURES_DIR", "tests/fixtures/api");
    cmd
}

#[test]
fn version_works() {
    Command::new(assert_cmd::cargo::cargo_bin!("extx"))
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("expensify-tx-cli"));
}

#[test]
fn auth_status_json_works_without_token() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args(["--output", "json", "auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("token_configured"))
        .stdout(predicate::str::contains("\"none\""))
        .stdout(predicate::str::contains("unknown"));
}

#[test]
fn login_status_logout_round_trip() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args(["auth", "login", "--email", "me@example.com", "--password", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("logged in as me@example.com"));

    let token_file = home.path().join(".config/expensify-tx-cli/token");
    let saved = std::fs::read_to_string(&token_file).unwrap();
    assert!(saved.contains("fixture-auth-token"));

    let out = extx(home.path())
        .args(["--output", "json", "auth", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let value = |key: &str| {
        rows.as_array()
            .unwrap()
            .iter()
            .find(|r| r["key"] == key)
            .map(|r| r["value"].as_str().unwrap().to_string())
    };
    assert_eq!(value("token_configured").as_deref(), Some("true"));
    assert_eq!(value("token_source").as_deref(), Some("file"));
    assert_eq!(value("token_valid").as_deref(), Some("true"));
    assert!(value("expires_at").is_some());

    extx(home.path())
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed token at"));
    assert!(!token_file.exists());
}

#[test]
fn login_requires_an_email() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args(["auth", "login", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing --email"));
}

#[test]
fn add_refuses_to_write_without_confirmation() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args([
            "transactions",
            "add",
            "--date",
            "2024-01-05",
            "--merchant",
            "Bakery",
            "--amount",
            "3.50",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("without --yes"));
}

#[test]
fn add_dry_run_describes_the_write() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args([
            "--dry-run",
            "transactions",
            "add",
            "--date",
            "2024-01-05",
            "--merchant",
            "Bakery",
            "--amount",
            "3.50",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "dry-run: would create debit -$3.50 at Bakery on 2024-01-05",
        ));
}

#[test]
fn add_rejects_future_dates_and_negative_amounts() {
    let home = tempfile::tempdir().unwrap();
    extx(home.path())
        .args([
            "transactions", "add", "--date", "2999-01-01", "--merchant", "Bakery", "--amount",
            "1", "--yes",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Future dates are not allowed."));

    extx(home.path())
        .args([
            "transactions", "add", "--date", "2024-01-05", "--merchant", "Bakery", "--amount",
            "-1", "--yes",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Please provide date, merchant, and a valid amount.",
        ));
}

#[test]
fn proxy_errors_surface_as_user_messages() {
    let home = tempfile::tempdir().unwrap();
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("extx"));
    cmd.env("HOME", home.path())
        .env_remove("EXTX_FIXTURES_DIR")
        .env_remove("EXTX_TOKEN")
        .env("EXTX_PROXY_URL", "http://127.0.0.1:9/proxy")
        .args(["transactions", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to fetch transactions."));
}
