//! Report persistence tests

use ndrill_knowledge::{write_report, KnowledgeBase, RunOutcome};
use tempfile::TempDir;

#[tokio::test]
async fn test_write_report_creates_named_file() {
    let dir = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new("https://app.example.test/login", "Assess auth");
    kb.record_failure("print(1)", "nothing");

    let path = write_report(dir.path(), &kb, &RunOutcome::Exhausted { cycles: 2 })
        .await
        .unwrap();

    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "ndrill_assessment_report_https___app_example_test_login.md"
    );
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("Assess auth"));
    assert!(content.contains("- Failed attempts: 1"));
    assert!(content.contains("## Result: Incomplete"));
}

#[tokio::test]
async fn test_write_report_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("reports").join("today");
    let kb = KnowledgeBase::new("t", "m");

    let path = write_report(&nested, &kb, &RunOutcome::Cancelled)
        .await
        .unwrap();
    assert!(path.starts_with(&nested));
    assert!(path.exists());
}

#[tokio::test]
async fn test_write_report_overwrites_previous_run() {
    let dir = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new("t", "m");
    write_report(dir.path(), &kb, &RunOutcome::Cancelled)
        .await
        .unwrap();

    kb.record_success("pwned");
    let path = write_report(dir.path(), &kb, &RunOutcome::ObjectiveAchieved)
        .await
        .unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("## Status: Objective achieved"));
    assert!(!content.contains("cancelled"));
}
