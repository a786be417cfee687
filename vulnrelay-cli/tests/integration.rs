use std::path::Path;
use std::process::{Command, Output};

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "dojo-api-key-123";

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// A `vulnrelay` command pointed at `server`, running `pipeline` in `workdir`.
fn vulnrelay(server: &MockServer, pipeline: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vulnrelay"));
    cmd.arg("--pipeline")
        .arg(pipeline)
        .arg("-C")
        .arg(workdir)
        .env("DEFECTDOJO_URL", format!("{}/api/v2", server.uri()))
        .env("DEFECTDOJO_API_KEY", API_KEY)
        .env("DEFECTDOJO_PRODUCT", "webshop")
        .env("DEFECTDOJO_ENGAGEMENT", "ci-main")
        .env("DEFECTDOJO_TAGS", "ci,nightly")
        .env_remove("DEFECTDOJO_TEST_ID")
        .env_remove("VULNRELAY_PIPELINE")
        .env_remove("RUST_LOG");
    cmd
}

fn json_report(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON report ({e}):\n{stdout}"))
}

fn stage_outcomes(report: &serde_json::Value) -> Vec<(String, String)> {
    report["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["name"].as_str().unwrap().to_string(),
                s["outcome"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

async fn mount_import(server: &MockServer, status: u16, body: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v2/import-scan/"))
        .and(header("Authorization", format!("Token {API_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scan_and_upload_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/import-scan/"))
        .and(header("Authorization", format!("Token {API_KEY}").as_str()))
        .and(body_string_contains("Trivy Scan"))
        .and(body_string_contains("webshop"))
        .and(body_string_contains("ci-main"))
        .and(body_string_contains("{\"Results\": []}"))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"test": 7}"#))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("scan-and-upload.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json_report(&output);
    assert_eq!(report["status"], "success");
    assert_eq!(
        stage_outcomes(&report),
        vec![
            ("clone".to_string(), "succeeded".to_string()),
            ("scan".to_string(), "succeeded".to_string()),
            ("upload".to_string(), "succeeded".to_string()),
        ]
    );
    assert!(dir.path().join("src/app.py").exists());
}

#[tokio::test]
async fn test_rejected_upload_exits_with_upload_code() {
    let server = MockServer::start().await;
    mount_import(&server, 400, r#"{"scan_type": ["invalid choice"]}"#, 1).await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("scan-and-upload.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(5));
    let report = json_report(&output);
    assert_eq!(report["status"], "failed");
    let stages = report["stages"].as_array().unwrap();
    assert_eq!(stages[0]["outcome"], "succeeded");
    assert_eq!(stages[1]["outcome"], "succeeded");
    assert_eq!(stages[2]["outcome"], "failed");
    let error = stages[2]["error"].as_str().unwrap();
    assert!(error.contains("HTTP 400"), "error: {error}");
    assert!(error.contains("invalid choice"), "error: {error}");
}

#[tokio::test]
async fn test_server_error_halts_remaining_uploads() {
    let server = MockServer::start().await;
    mount_import(&server, 500, "Internal Server Error: database is locked", 1).await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("two-uploads.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(5));
    let report = json_report(&output);
    assert_eq!(report["status"], "failed");
    assert_eq!(
        stage_outcomes(&report),
        vec![
            ("trivy".to_string(), "succeeded".to_string()),
            ("dependency-check".to_string(), "succeeded".to_string()),
            ("upload-trivy".to_string(), "failed".to_string()),
        ]
    );
    let error = report["error"].as_str().unwrap();
    assert!(error.contains("HTTP 500"), "error: {error}");
    assert!(error.contains("database is locked"), "error: {error}");
}

#[tokio::test]
async fn test_tolerated_scan_failure_blocks_upload() {
    let server = MockServer::start().await;
    mount_import(&server, 201, "{}", 0).await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("tolerated-scan.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(3));
    let report = json_report(&output);
    assert_eq!(report["status"], "failed");
    assert_eq!(
        stage_outcomes(&report),
        vec![
            ("scan".to_string(), "tolerated".to_string()),
            ("upload".to_string(), "failed".to_string()),
        ]
    );
    assert!(report["stages"][0]["error"].as_str().unwrap().contains("scanner crashed"));
    assert!(report["error"].as_str().unwrap().contains("report.json"));
}

#[tokio::test]
async fn test_missing_output_is_postcondition_failure() {
    let server = MockServer::start().await;
    mount_import(&server, 201, "{}", 0).await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("missing-output.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(3));
    let report = json_report(&output);
    assert_eq!(stage_outcomes(&report), vec![("scan".to_string(), "failed".to_string())]);
}

#[tokio::test]
async fn test_tolerated_failure_reports_warnings() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("warnings.yml"), dir.path())
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(0));
    let report = json_report(&output);
    assert_eq!(report["status"], "success-with-warnings");
    assert!(dir.path().join("after.marker").exists());
}

#[tokio::test]
async fn test_failing_tool_does_not_leak_secret() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("secret-leak.yml"), dir.path())
        .env("SCAN_TOKEN", "squ_very_secret_value")
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(4));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stdout.contains("squ_very_secret_value"), "stdout: {stdout}");
    assert!(!stderr.contains("squ_very_secret_value"), "stderr: {stderr}");
    assert!(!stderr.contains(API_KEY), "stderr: {stderr}");

    let report = json_report(&output);
    let error = report["stages"][0]["error"].as_str().unwrap();
    assert!(error.contains("login failed for token ****"), "error: {error}");
}

#[tokio::test]
async fn test_missing_variable_fails_before_any_stage() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("required-env.yml"), dir.path())
        .env_remove("REPO_URL")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("REPO_URL"), "stderr: {stderr}");
    assert_eq!(stderr.matches("is not set").count(), 1, "stderr: {stderr}");
    assert!(!dir.path().join("cloned.marker").exists());
}

#[tokio::test]
async fn test_invalid_backend_url_is_config_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("scan-and-upload.yml"), dir.path())
        .env("DEFECTDOJO_URL", "dojo.example.com/api/v2")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("src").exists());
}

#[tokio::test]
async fn test_check_prints_plan_without_running() {
    let server = MockServer::start().await;
    mount_import(&server, 201, "{}", 0).await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("scan-and-upload.yml"), dir.path())
        .arg("--check")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1. clone: run sh"), "stdout: {stdout}");
    assert!(stdout.contains("3. upload: upload"), "stdout: {stdout}");
    assert!(stdout.contains("requires report (report.json)"), "stdout: {stdout}");
    assert!(!dir.path().join("src").exists());
}

#[tokio::test]
async fn test_fetch_script_run_and_upload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/raw/enhance.sh"))
        .and(header("PRIVATE-TOKEN", "glpat-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("echo '{\"issues\": [], \"enhanced\": true}' > \"$1\"\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/import-scan/"))
        .and(body_string_contains("SonarQube Scan"))
        .and(body_string_contains("\"enhanced\": true"))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let output = vulnrelay(&server, &fixture("fetch-and-enhance.yml"), dir.path())
        .env("SCRIPT_HOST", server.uri())
        .env("GITLAB_TOKEN", "glpat-test")
        .arg("--json")
        .output()
        .expect("failed to run vulnrelay");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json_report(&output);
    assert_eq!(report["status"], "success");
    assert_eq!(report["stages"].as_array().unwrap().len(), 3);
    assert!(dir.path().join("enhance.sh").exists());
    assert!(dir.path().join("enhanced-report.json").exists());
}

#[tokio::test]
async fn test_reference_pipeline_validates() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline = format!("{}/../pipelines/security-scan.yml", env!("CARGO_MANIFEST_DIR"));

    let output = vulnrelay(&server, &pipeline, dir.path())
        .arg("--check")
        .env("REPO_URL", "https://git.example.com/shop.git")
        .env("SONARQUBE_URL", "https://sonar.example.com")
        .env("SONARQUBE_PROJECT_ID", "shop")
        .env("SONARQUBE_PASSWORD", "sonar-pass")
        .env("SONAR_TOKEN", "squ_token")
        .env("SCRIPT_URL", "https://git.example.com/raw/add_mitigation_impact.py")
        .env("GITLAB_TOKEN", "glpat-test")
        .output()
        .expect("failed to run vulnrelay");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("9. upload-trivy: upload trivy-report.json (json) as 'Trivy Scan'"));
    assert!(stdout.contains("script python3 add_mitigation_impact.py"));
    assert!(!stdout.contains("sonar-pass"));
    assert!(!stdout.contains("on failure: continue"), "stdout: {stdout}");
}
