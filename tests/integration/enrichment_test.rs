use std::fs;
use std::time::Duration;

use clinic_silver::models::{EnrichmentMode, MappingStatus, Stage, StageStatus};
use clinic_silver::utils::io::summary::read_unit_summary;
use clinic_silver::{BatchProcessor, Credentials, RunStatus, UnitState, Value};

use crate::utils::{Behaviour, MockGeocoder, MockTerminology, Workspace, read_output, visits_batch};

#[tokio::test]
async fn test_missing_credentials_degrade_gracefully() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.degraded, 1);
    assert!(summary.units[0].degraded);

    let output = read_output(&ws.flat_output("silver_visits"));
    assert_eq!(output.num_rows(), 3);
    assert!(output.column("diagnosis_code_cui").is_none());
    assert_eq!(output.records[0].get("region"), &Value::from("US-IL"));
    assert_eq!(output.records[1].get("region"), &Value::from("US-MA"));
    assert_eq!(output.records[0].get("geo_source"), &Value::from("offline"));
    assert_eq!(output.records[0].get("lat"), &Value::Float(39.78));
    assert_eq!(output.records[1].get("lng"), &Value::Float(-71.06));

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.enrichment.mode, EnrichmentMode::Degraded);
    assert_eq!(result.enrichment.attempted, 3);
    assert_eq!(result.enrichment.enriched, 3);
    assert_eq!(result.stage_status(Stage::Geo), Some(StageStatus::Degraded));
    assert_eq!(result.stage_status(Stage::Vocabulary), Some(StageStatus::Skipped));
    assert_eq!(result.mapping.status, MappingStatus::Skipped);
}

#[tokio::test]
async fn test_full_enrichment_and_mapping() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let geocoder = MockGeocoder::new(Behaviour::Answer);
    let terminology = MockTerminology::new();
    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .with_geocoder(geocoder.clone())
        .with_terminology(terminology.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.degraded, 0);

    // Rows 0 and 2 differ only by their coordinates
    assert_eq!(geocoder.calls(), 3);
    // E11.9 appears twice but is resolved once
    assert_eq!(terminology.calls(), 2);

    let output = read_output(&ws.flat_output("silver_visits"));
    assert_eq!(output.records[0].get("region"), &Value::from("US-XX"));
    assert_eq!(output.records[1].get("locality"), &Value::from("Boston"));
    assert_eq!(output.records[0].get("geo_source"), &Value::from("api"));
    assert_eq!(
        output.records[0].get("diagnosis_code_cui"),
        &Value::from("C0011860")
    );
    assert_eq!(
        output.records[2].get("diagnosis_code_cui"),
        &Value::from("C0011860")
    );
    assert_eq!(
        output.records[1].get("diagnosis_code_concept"),
        &Value::from("Hypertensive disease")
    );

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.enrichment.mode, EnrichmentMode::Full);
    assert_eq!(result.enrichment.lookups, 3);
    assert_eq!(result.stage_status(Stage::Geo), Some(StageStatus::Applied));
    assert_eq!(result.mapping.hits, 3);
    assert_eq!(result.mapping.misses, 0);
    assert_eq!(result.mapping.lookups, 2);
    assert_eq!(result.mapping.source.as_deref(), Some("mock"));
}

#[tokio::test]
async fn test_unavailable_geocoder_passes_records_through() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let mut config = ws.config();
    config.geo.failure_threshold = 2;
    let geocoder = MockGeocoder::new(Behaviour::Unavailable);

    let summary = BatchProcessor::new(config, Credentials::none())
        .with_geocoder(geocoder.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.degraded, 1);

    // The third record is not looked up once the threshold trips
    assert_eq!(geocoder.calls(), 2);

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.state, UnitState::Completed);
    assert_eq!(result.records_out, 3);
    assert_eq!(result.stage_status(Stage::Geo), Some(StageStatus::Failed));
    assert!(result.enrichment.dependency_unavailable);
    assert_eq!(result.enrichment.failures, 3);
    assert_eq!(result.enrichment.enriched, 0);

    let output = read_output(&ws.flat_output("silver_visits"));
    assert!(output.records.iter().all(|r| r.get("region").is_null()));
}

#[tokio::test]
async fn test_slow_geocoder_times_out_and_passes_records_through() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let mut config = ws.config();
    config.geo.timeout = Duration::from_millis(50);
    config.geo.failure_threshold = 2;
    let geocoder = MockGeocoder::new(Behaviour::Slow);

    let summary = BatchProcessor::new(config, Credentials::none())
        .with_geocoder(geocoder.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.degraded, 1);

    // Two timeouts trip the threshold before the third record is looked up
    assert_eq!(geocoder.calls(), 2);

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.state, UnitState::Completed);
    assert_eq!(result.records_out, 3);
    assert_eq!(result.stage_status(Stage::Geo), Some(StageStatus::Failed));
    assert!(result.enrichment.dependency_unavailable);

    let output = read_output(&ws.flat_output("silver_visits"));
    assert_eq!(output.records[1].get("city"), &Value::from("Boston"));
    assert!(output.records.iter().all(|r| r.get("region").is_null()));
}

#[tokio::test]
async fn test_geocoder_secret_stays_out_of_summaries() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let mut config = ws.config();
    config.geo.endpoint = "http://127.0.0.1:1".to_string();
    config.geo.failure_threshold = 1;
    let credentials = Credentials::none().with_geo("SUPERSECRETKEY123");

    let summary = BatchProcessor::new(config, credentials)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert!(result.enrichment.dependency_unavailable);

    let unit_summary = fs::read_to_string(ws.summary("silver_visits")).unwrap();
    assert!(unit_summary.contains("unavailable"));
    assert!(!unit_summary.contains("SUPERSECRETKEY123"));
}

#[tokio::test]
async fn test_local_terminology_index_is_used_without_credential() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    let umls = tempfile::tempdir().unwrap();
    fs::write(
        umls.path().join("MRCONSO.RRF"),
        "C0011860|ENG|P|L0011860|PF|S0028441|Y|A0040974||||ICD10CM|PT|E11.9|Type 2 diabetes mellitus without complications|0|N||\n",
    )
    .unwrap();

    let mut config = ws.config();
    config.vocabulary.local_data_path = Some(umls.path().to_path_buf());

    BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.stage_status(Stage::Vocabulary), Some(StageStatus::Applied));
    assert_eq!(result.mapping.source.as_deref(), Some("local"));
    assert_eq!(result.mapping.hits, 2);
    assert_eq!(result.mapping.misses, 1);

    let output = read_output(&ws.flat_output("silver_visits"));
    assert_eq!(
        output.records[0].get("diagnosis_code_cui"),
        &Value::from("C0011860")
    );
    assert!(output.records[1].get("diagnosis_code_cui").is_null());
}
