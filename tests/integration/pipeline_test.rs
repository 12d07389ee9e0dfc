use std::collections::BTreeMap;
use std::fs;

use clinic_silver::models::{Stage, StageStatus};
use clinic_silver::processor::{PIPELINE_COLUMN, PIPELINE_NAME, SOURCE_FILE_COLUMN};
use clinic_silver::utils::io::summary::read_unit_summary;
use clinic_silver::{
    BatchProcessor, Credentials, PiiMode, RunStatus, TokenSalt, UnitState, Value,
};

use crate::utils::{
    PHI_LITERALS, Workspace, all_text, concatenated_names_batch, jane_doe_batch, read_output,
    visits_batch,
};

#[tokio::test]
async fn test_jane_doe_remove_mode() {
    let ws = Workspace::new();
    ws.write_unit("jane.parquet", &jane_doe_batch());

    let summary = BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.succeeded, 1);

    let output = read_output(&ws.flat_output("silver_jane"));
    assert_eq!(output.num_rows(), 1);
    let record = &output.records[0];
    assert!(record.get("name").is_null());
    assert!(record.get("dob").is_null());
    assert_eq!(record.get("city"), &Value::from("Springfield"));
    assert_eq!(record.get("region"), &Value::from("US-IL"));
    assert_eq!(record.get(SOURCE_FILE_COLUMN), &Value::from("jane.parquet"));
    assert_eq!(record.get(PIPELINE_COLUMN), &Value::from(PIPELINE_NAME));

    let result = read_unit_summary(&ws.summary("silver_jane")).unwrap();
    assert_eq!(result.state, UnitState::Completed);
    assert_eq!(
        result.redactions,
        BTreeMap::from([("dob".to_string(), 1), ("name".to_string(), 1)])
    );
    assert_eq!(result.records_in, 1);
    assert_eq!(result.records_out, 1);
    assert_eq!(result.stage_status(Stage::Redact), Some(StageStatus::Applied));
    assert_eq!(result.stage_status(Stage::Write), Some(StageStatus::Applied));
}

#[tokio::test]
async fn test_no_phi_literal_survives() {
    for mode in [PiiMode::Remove, PiiMode::Tokenize] {
        let ws = Workspace::new();
        ws.write_unit("visits.parquet", &visits_batch());
        ws.write_unit("jane.parquet", &jane_doe_batch());

        let config = ws.config().with_pii_mode(mode);
        let summary = BatchProcessor::new(config, Credentials::none())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 2, "{mode} run");

        for name in ["silver_visits", "silver_jane"] {
            let text = all_text(&read_output(&ws.flat_output(name)));
            for literal in PHI_LITERALS {
                assert!(
                    text.iter().all(|value| !value.contains(literal)),
                    "{literal} survived in {name} ({mode} mode)"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_tokens_are_consistent_across_units() {
    let ws = Workspace::new();
    ws.write_unit("a/visits.parquet", &visits_batch());
    ws.write_unit("b/visits.parquet", &visits_batch());

    let config = ws.config().with_pii_mode(PiiMode::Tokenize);
    BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();

    let a = read_output(&ws.flat_output("silver_a__visits"));
    let b = read_output(&ws.flat_output("silver_b__visits"));
    let expected = Value::from(TokenSalt::new("test-salt").token("Jane Doe"));

    assert_eq!(a.records[0].get("patient_name"), &expected);
    assert_eq!(a.records[2].get("patient_name"), &expected);
    assert_eq!(b.records[0].get("patient_name"), &expected);
    assert_ne!(a.records[1].get("patient_name"), &expected);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());
    let config = ws.config().with_pii_mode(PiiMode::Tokenize);

    BatchProcessor::new(config.clone(), Credentials::none())
        .run()
        .await
        .unwrap();
    let first = read_output(&ws.flat_output("silver_visits"));
    let mut first_listing: Vec<_> = fs::read_dir(&ws.silver)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    first_listing.sort();

    BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();
    let second = read_output(&ws.flat_output("silver_visits"));
    let mut second_listing: Vec<_> = fs::read_dir(&ws.silver)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    second_listing.sort();

    assert_eq!(first, second);
    assert_eq!(first_listing, second_listing);
    assert_eq!(
        second_listing,
        vec![
            "_run_summary.json",
            "silver_visits.parquet",
            "silver_visits.summary.json"
        ]
    );
}

#[tokio::test]
async fn test_free_text_spans_are_scrubbed() {
    let ws = Workspace::new();
    ws.write_unit("visits.parquet", &visits_batch());

    BatchProcessor::new(ws.config(), Credentials::none())
        .run()
        .await
        .unwrap();

    let output = read_output(&ws.flat_output("silver_visits"));
    assert_eq!(
        output.records[0].get("notes"),
        &Value::from("Call [REDACTED] to confirm")
    );
    assert_eq!(output.records[1].get("notes"), &Value::from("Routine follow-up"));

    let result = read_unit_summary(&ws.summary("silver_visits")).unwrap();
    assert_eq!(result.detector_hits.get("phone"), Some(&1));
    assert_eq!(result.redactions.get("notes"), Some(&1));
    assert_eq!(result.redactions.get("patient_name"), Some(&3));
}

#[tokio::test]
async fn test_concatenated_person_columns_are_redacted() {
    let ws = Workspace::new();
    ws.write_unit("people.parquet", &concatenated_names_batch());

    let config = ws.config().with_pii_mode(PiiMode::Remove);
    BatchProcessor::new(config, Credentials::none())
        .run()
        .await
        .unwrap();

    let output = read_output(&ws.flat_output("silver_people"));
    let record = &output.records[0];
    for column in ["firstname", "lastname", "patientname", "fullname", "phonenumber"] {
        assert!(record.get(column).is_null(), "{column}");
    }
    assert_eq!(record.get("city"), &Value::from("Springfield"));

    let text = all_text(&output);
    assert!(!text.iter().any(|v| v.contains("Jane") || v.contains("Doe")));

    let result = read_unit_summary(&ws.summary("silver_people")).unwrap();
    assert_eq!(result.redactions.len(), 5);
}
