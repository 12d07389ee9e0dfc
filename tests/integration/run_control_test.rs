use std::fs;

use chrono::NaiveDate;
use clinic_silver::models::{Stage, StageStatus};
use clinic_silver::utils::io::publish::{LOG_DIR, PART_FILE, STAGING_DIR, existing_versions};
use clinic_silver::utils::io::summary::{RUN_SUMMARY_FILE, read_run_summary, read_unit_summary};
use clinic_silver::{
    BatchProcessor, CancellationFlag, Credentials, OutputFormat, RunStatus, UnitState, Value,
};

use crate::utils::{Workspace, jane_doe_batch, read_output, visits_batch};

#[tokio::test]
async fn test_empty_bronze_reports_no_work() {
    let ws = Workspace::new();

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::NoWork);
    assert_eq!(summary.exit_code(), 0);
    assert!(ws.silver.join(RUN_SUMMARY_FILE).is_file());
}

#[tokio::test]
async fn test_missing_bronze_aborts_the_run() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.input_dir = ws.bronze.join("does-not-exist");

    let err = BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert!(!ws.silver.join(RUN_SUMMARY_FILE).exists());
}

#[tokio::test]
async fn test_cancelled_run_skips_every_unit() {
    let ws = Workspace::new();
    ws.write_unit("jane.parquet", &jane_doe_batch());
    ws.write_unit("visits.parquet", &visits_batch());

    let cancellation = CancellationFlag::new();
    cancellation.cancel();

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .with_cancellation(cancellation)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.exit_code(), 130);
    assert_eq!(summary.skipped, 2);
    assert!(summary.units.iter().all(|u| u.state == UnitState::Skipped));
    assert!(
        summary
            .units
            .iter()
            .all(|u| u.error.as_ref().is_some_and(|e| e.kind == "cancelled"))
    );

    assert!(!ws.flat_output("silver_jane").exists());
    assert!(!ws.summary("silver_jane").exists());
    assert_eq!(read_run_summary(&ws.silver).unwrap().skipped, 2);
}

#[tokio::test]
async fn test_versioned_output_keeps_history() {
    let ws = Workspace::new();
    ws.write_unit("jane.parquet", &jane_doe_batch());
    let config = ws.config().with_output_format(OutputFormat::Versioned);

    for _ in 0..2 {
        let summary = BatchProcessor::new(config.clone(), Credentials::none())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Success);
    }

    let table = ws.silver.join("silver_jane");
    assert!(table.join(PART_FILE).is_file());
    assert_eq!(existing_versions(&table.join(LOG_DIR)).unwrap(), vec![0, 1]);

    let output = read_output(&table.join(PART_FILE));
    assert_eq!(output.num_rows(), 1);

    let result = read_unit_summary(&ws.summary("silver_jane")).unwrap();
    assert_eq!(result.output.as_deref(), Some(table.as_path()));
    assert_eq!(result.output_format, OutputFormat::Versioned);
}

#[tokio::test]
async fn test_unwritable_output_fails_only_its_unit() {
    let ws = Workspace::new();
    ws.write_unit("jane.parquet", &jane_doe_batch());
    ws.write_unit("visits.parquet", &visits_batch());
    let config = ws.config().with_output_format(OutputFormat::Versioned);

    BatchProcessor::new(config.clone(), Credentials::none())
        .run()
        .await
        .unwrap();

    // A directory where the first commit record should be cannot be carried forward
    let commit = ws
        .silver
        .join("silver_jane")
        .join(LOG_DIR)
        .join("00000000000000000000.json");
    fs::remove_file(&commit).unwrap();
    fs::create_dir(&commit).unwrap();

    let summary = BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::PartialSuccess);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let jane = read_unit_summary(&ws.summary("silver_jane")).unwrap();
    assert_eq!(jane.state, UnitState::Failed);
    assert_eq!(jane.output, None);
    assert_eq!(jane.error.as_ref().map(|e| e.kind.as_str()), Some("write"));
    assert_eq!(jane.stage_status(Stage::Write), Some(StageStatus::Failed));

    let visits = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(visits.state, UnitState::Completed);
    assert_eq!(
        existing_versions(&ws.silver.join("silver_visits").join(LOG_DIR)).unwrap(),
        vec![0, 1]
    );
    assert!(!ws.silver.join(STAGING_DIR).exists());
}

#[tokio::test]
async fn test_date_shift_moves_non_phi_dates() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());
    let config = ws.config().with_date_shift_days(-10);

    BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();

    let output = read_output(&ws.flat_output("silver_visits"));
    let shifted = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
    assert_eq!(output.records[0].get("admission_date"), &Value::Date(shifted));
    assert!(output.records[2].get("admission_date").is_null());

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.dates_shifted, 2);
    assert_eq!(result.date_shift_days, Some(-10));
}

#[tokio::test]
async fn test_nested_units_get_distinct_names() {
    let ws = Workspace::new();
    ws.write_unit("2024/visits.parquet", &visits_batch());
    ws.write_unit("visits.parquet", &visits_batch());

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 2);

    assert!(ws.flat_output("silver_2024__visits").is_file());
    assert!(ws.flat_output("silver_visits").is_file());

    let nested = read_unit_summary(&ws.summary("silver_2024__visits")).unwrap();
    assert_eq!(nested.stage_status(Stage::Write), Some(StageStatus::Applied));
    let output = read_output(&ws.flat_output("silver_2024__visits"));
    assert_eq!(output.records[0].get("source_file"), &Value::from("visits.parquet"));
}
