//! Integration tests for retry policy files

mod common;

use camino::Utf8PathBuf;
use common::FlakyService;
use sindri_retry::{retry, Attempt, Error, FailReason, RetryPoliciesConfig, TracingObserver};
use tempfile::TempDir;

const POLICIES: &str = r#"
default:
  tries: 3
  wait-min-ms: 50
operations:
  download:
    tries: 2
    factor: 2
  health-check:
    tries: 1
"#;

fn write_policies(dir: &TempDir, name: &str, content: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::try_from(dir.path().join(name)).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test(start_paused = true)]
async fn test_policy_file_drives_run() {
    let dir = TempDir::new().unwrap();
    let path = write_policies(&dir, "retry-policies.yaml", POLICIES);
    let config = RetryPoliciesConfig::load(&path).unwrap();

    let policy = config
        .policy_builder("download")
        .with_observer(TracingObserver::new("download"))
        .build()
        .unwrap();

    let service = FlakyService::new([]);
    let outcome = retry(|_: Attempt| service.fetch(), &policy).await;

    assert_eq!(outcome.reason(), Some(FailReason::TriesExhausted));
    assert_eq!(outcome.context().attempts(), 2);
    assert_eq!(
        outcome.context().elapsed(),
        std::time::Duration::from_millis(50)
    );
}

#[test]
fn test_invalid_policy_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_policies(&dir, "bad.yaml", "default:\n  factor: -1\n");

    let err = RetryPoliciesConfig::load(&path).unwrap_err();
    assert!(err.is_range_error());
    assert_eq!(err.to_string(), "'factor' should be >= 0");
}

#[test]
fn test_malformed_policy_file() {
    let dir = TempDir::new().unwrap();
    let path = write_policies(&dir, "broken.yaml", "default: [not, a, map]\n");

    let err = RetryPoliciesConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::YamlParse(_)));
}

#[test]
fn test_missing_policy_file() {
    let err = RetryPoliciesConfig::load(camino::Utf8Path::new("/nonexistent/retry.yaml"))
        .unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
}
