use clinic_silver::models::{Stage, StageStatus};
use clinic_silver::utils::io::publish::STAGING_DIR;
use clinic_silver::utils::io::summary::{read_run_summary, read_unit_summary};
use clinic_silver::{BatchProcessor, Credentials, RunStatus, UnitState};

use crate::utils::{Workspace, jane_doe_batch, unclassifiable_batch, visits_batch};

#[tokio::test]
async fn test_one_malformed_unit_is_isolated() {
    let ws = Workspace::new();
    ws.write_unit("a.parquet", &jane_doe_batch());
    ws.write_unit("b.parquet", &visits_batch());
    ws.write_garbage("c.parquet");

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, RunStatus::PartialSuccess);
    assert_eq!(summary.exit_code(), 2);

    assert!(ws.flat_output("silver_a").is_file());
    assert!(ws.flat_output("silver_b").is_file());
    assert!(!ws.flat_output("silver_c").exists());
    assert!(!ws.silver.join(STAGING_DIR).exists());

    // The failed unit still leaves an auditable summary
    let failed = read_unit_summary(&ws.summary("silver_c")).unwrap();
    assert_eq!(failed.state, UnitState::Failed);
    assert_eq!(failed.output, None);
    assert_eq!(failed.error.as_ref().map(|e| e.kind.as_str()), Some("read"));

    let persisted = read_run_summary(&ws.silver).unwrap();
    assert_eq!(persisted, summary);
    assert_eq!(persisted.units[2].unit.to_str(), Some("c.parquet"));
    assert_eq!(persisted.units[2].state, UnitState::Failed);
}

#[tokio::test]
async fn test_strict_schema_fails_only_the_unclassifiable_unit() {
    let ws = Workspace::new();
    ws.write_unit("jane.parquet", &jane_doe_batch());
    ws.write_unit("odd.parquet", &unclassifiable_batch());

    let config = ws.config().with_strict_schema(true);
    let summary = BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::PartialSuccess);

    let odd = read_unit_summary(&ws.summary("silver_odd")).unwrap();
    assert_eq!(odd.state, UnitState::Failed);
    assert_eq!(odd.error.as_ref().map(|e| e.kind.as_str()), Some("schema"));
    assert_eq!(odd.stage_status(Stage::Redact), Some(StageStatus::Failed));
    assert!(!ws.flat_output("silver_odd").exists());

    let jane = read_unit_summary(&ws.summary("silver_jane")).unwrap();
    assert_eq!(jane.state, UnitState::Completed);
}

#[tokio::test]
async fn test_lenient_schema_passes_unclassifiable_unit_through() {
    let ws = Workspace::new();
    ws.write_unit("odd.parquet", &unclassifiable_batch());

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);

    let odd = read_unit_summary(&ws.summary("silver_odd")).unwrap();
    assert!(odd.redactions.is_empty());
    assert_eq!(odd.stage_status(Stage::Geo), Some(StageStatus::NotApplicable));
}

#[tokio::test]
async fn test_units_sharing_an_output_name_both_fail() {
    let ws = Workspace::new();
    ws.write_unit("a/b.parquet", &jane_doe_batch());
    ws.write_unit("a__b.parquet", &visits_batch());
    ws.write_unit("jane.parquet", &jane_doe_batch());

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::PartialSuccess);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);

    for unit in summary.units.iter().filter(|u| u.state == UnitState::Failed) {
        assert_eq!(unit.output, None);
        let error = unit.error.as_ref().unwrap();
        assert_eq!(error.kind, "output_collision");
        assert!(error.message.contains("a/b.parquet"));
        assert!(error.message.contains("a__b.parquet"));
    }

    assert!(!ws.flat_output("silver_a__b").exists());
    assert!(!ws.summary("silver_a__b").exists());
    assert!(ws.flat_output("silver_jane").is_file());
    assert_eq!(read_run_summary(&ws.silver).unwrap().failed, 2);
}
