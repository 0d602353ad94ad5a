//! Tests for main.rs startup validation (JWT secrets, client URL, etc.)

use std::fs;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

const ACCESS_SECRET: &str = "test-access-secret-that-is-long-enough";
const REFRESH_SECRET: &str = "test-refresh-secret-that-is-long-enough";

fn cargo_bin() -> std::path::PathBuf {
    // Get the path to the compiled binary
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps
    path.push("wellvantage");
    path
}

/// Command with Google credentials and an in-memory database, but no secrets.
fn base_command() -> Command {
    let mut command = Command::new(cargo_bin());
    command
        .env_remove("JWT_SECRET")
        .env_remove("JWT_REFRESH_SECRET")
        .env_remove("PRODUCTION")
        .env_remove("CLIENT_URL")
        .env("GOOGLE_CLIENT_ID", "test-client-id")
        .env("GOOGLE_CLIENT_SECRET", "test-client-secret")
        .args(["--database", ":memory:", "--port", "0"])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped());
    command
}

fn combined_output(command: &mut Command) -> (bool, String) {
    let output = command.output().expect("Failed to run binary");
    // tracing logs to stdout by default
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    (output.status.success(), format!("{}{}", stdout, stderr))
}

fn assert_still_running(mut child: Child) {
    // Give it a moment to start or fail
    std::thread::sleep(Duration::from_millis(500));

    match child.try_wait() {
        Ok(Some(status)) => {
            let output = child.wait_with_output().unwrap();
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!(
                "Server exited unexpectedly with status {:?}, output: {}{}",
                status, stdout, stderr
            );
        }
        Ok(None) => {
            // Still running - good! Kill it.
            child.kill().ok();
        }
        Err(e) => {
            panic!("Error checking process status: {}", e);
        }
    }
}

#[test]
fn test_missing_jwt_secret_exits_with_error() {
    let (success, output) = combined_output(base_command().env("JWT_REFRESH_SECRET", REFRESH_SECRET));

    assert!(!success, "Should exit with error when JWT_SECRET is missing");
    assert!(
        output.contains("JWT_SECRET") && output.contains("required"),
        "Should mention JWT_SECRET is required, got: {}",
        output
    );
}

#[test]
fn test_missing_refresh_secret_exits_with_error() {
    let (success, output) = combined_output(base_command().env("JWT_SECRET", ACCESS_SECRET));

    assert!(!success);
    assert!(
        output.contains("JWT_REFRESH_SECRET") && output.contains("required"),
        "Should mention JWT_REFRESH_SECRET is required, got: {}",
        output
    );
}

#[test]
fn test_identical_secrets_exit_with_error() {
    let (success, output) = combined_output(
        base_command()
            .env("JWT_SECRET", ACCESS_SECRET)
            .env("JWT_REFRESH_SECRET", ACCESS_SECRET),
    );

    assert!(!success);
    assert!(
        output.contains("must be different"),
        "Should reject identical secrets, got: {}",
        output
    );
}

#[test]
fn test_short_secret_exits_with_error() {
    let (success, output) = combined_output(
        base_command()
            .env("JWT_SECRET", "short")
            .env("JWT_REFRESH_SECRET", REFRESH_SECRET),
    );

    assert!(!success);
    assert!(output.contains("shorter than"), "got: {}", output);
}

#[test]
fn test_production_http_client_exits_with_error() {
    let (success, output) = combined_output(
        base_command()
            .env("JWT_SECRET", ACCESS_SECRET)
            .env("JWT_REFRESH_SECRET", REFRESH_SECRET)
            .args(["--production", "--client-url", "http://example.com"]),
    );

    assert!(!success, "Should exit with error when using HTTP in production");
    assert!(
        output.contains("HTTPS"),
        "Should mention HTTPS requirement, got: {}",
        output
    );
}

#[test]
fn test_development_server_starts() {
    let child = base_command()
        .env("JWT_SECRET", ACCESS_SECRET)
        .env("JWT_REFRESH_SECRET", REFRESH_SECRET)
        .spawn()
        .expect("Failed to run binary");

    assert_still_running(child);
}

#[test]
fn test_production_https_client_starts() {
    let child = base_command()
        .env("JWT_SECRET", ACCESS_SECRET)
        .env("JWT_REFRESH_SECRET", REFRESH_SECRET)
        .args(["--production", "--client-url", "https://app.example.com"])
        .spawn()
        .expect("Failed to run binary");

    assert_still_running(child);
}

#[test]
fn test_jwt_secret_files() {
    let temp_dir = std::env::temp_dir();
    let access_file = temp_dir.join(format!("jwt_access_test_{}", std::process::id()));
    let refresh_file = temp_dir.join(format!("jwt_refresh_test_{}", std::process::id()));
    fs::write(&access_file, "this-is-a-long-access-secret-from-file\n").unwrap();
    fs::write(&refresh_file, "this-is-a-long-refresh-secret-from-file\n").unwrap();

    let child = base_command()
        .args([
            "--jwt-secret-file",
            access_file.to_str().unwrap(),
            "--jwt-refresh-secret-file",
            refresh_file.to_str().unwrap(),
        ])
        .spawn()
        .expect("Failed to run binary");

    assert_still_running(child);

    fs::remove_file(&access_file).ok();
    fs::remove_file(&refresh_file).ok();
}
