use chrono::{TimeZone, Utc};
use formpost_core::{
    chunk, BuiltPayload, Chunk, HeaderMapping, Mode, NormalizationRules, OutcomeStatus, Payload,
    Row, SubmissionOutcome,
};
use formpost_engine::{prepare_chunks, verify, OutcomeLog, PayloadMismatch, UnsubmittedRow};
use pretty_assertions::assert_eq;

fn prepared(count: usize) -> Vec<Chunk<BuiltPayload>> {
    let mapping = HeaderMapping::new([("Name", "entry.1"), ("Q1", "entry.2")]).unwrap();
    let rows: Vec<Row> = (0..count)
        .map(|i| {
            Row::new(
                i,
                vec![
                    ("Name".to_string(), format!("r{i}")),
                    ("Q1".to_string(), "agree".to_string()),
                ],
            )
        })
        .collect();
    let chunks = chunk(&rows, 2).unwrap();
    prepare_chunks(&chunks, &mapping, &NormalizationRules::new())
        .unwrap()
        .0
}

fn outcome(row: usize, mode: Mode, status: OutcomeStatus, answer: &str) -> SubmissionOutcome {
    let payload = Payload::from_pairs([
        ("entry.1", format!("r{row}")),
        ("entry.2", answer.to_string()),
    ]);
    SubmissionOutcome {
        row_index: row,
        chunk_index: row / 2,
        attempt: 1,
        mode,
        status,
        payload_digest: payload.digest(),
        payload: Some(payload),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap(),
    }
}

fn ok() -> OutcomeStatus {
    OutcomeStatus::Success { code: 200 }
}

#[test]
fn missing_rows_and_drifted_payloads_are_reported() {
    let chunks = prepared(4);
    let log = OutcomeLog::in_memory();
    log.append(outcome(0, Mode::Live, ok(), "agree")).unwrap();
    log.append(outcome(1, Mode::Live, OutcomeStatus::HttpFailure { code: 500 }, "agree"))
        .unwrap();
    log.append(outcome(2, Mode::DryRun, OutcomeStatus::DryRunOk, "agree"))
        .unwrap();
    log.append(outcome(3, Mode::Live, ok(), "disagree")).unwrap();
    log.append(outcome(9, Mode::Live, ok(), "agree")).unwrap();

    let report = verify(&log, &chunks, Mode::Live);

    assert_eq!(report.dataset_rows, 4);
    assert_eq!(report.log_entries, 4);
    assert_eq!(report.successful_entries, 3);
    assert_eq!(report.failed_entries, 1);
    assert_eq!(
        report.unsubmitted,
        vec![
            UnsubmittedRow {
                row_index: 1,
                last_status: Some(OutcomeStatus::HttpFailure { code: 500 }),
            },
            UnsubmittedRow {
                row_index: 2,
                last_status: None,
            },
        ]
    );
    assert_eq!(report.unsubmitted_rows(), vec![1, 2]);

    let expected_digest = chunks[1].rows[1].payload.digest();
    assert_eq!(
        report.mismatches,
        vec![
            PayloadMismatch::Digest {
                row_index: 3,
                attempt: 1,
                recorded: outcome(3, Mode::Live, ok(), "disagree").payload_digest,
                expected: expected_digest,
                fields: vec!["entry.2".to_string()],
            },
            PayloadMismatch::UnknownRow {
                row_index: 9,
                attempt: 1,
            },
        ]
    );
    assert!(!report.is_complete());
}

#[test]
fn a_retried_row_counts_once_it_succeeds() {
    let chunks = prepared(2);
    let log = OutcomeLog::in_memory();
    log.append(outcome(0, Mode::Live, OutcomeStatus::HttpFailure { code: 503 }, "agree"))
        .unwrap();
    log.append(outcome(0, Mode::Live, ok(), "agree")).unwrap();
    log.append(outcome(1, Mode::Live, ok(), "agree")).unwrap();

    let report = verify(&log, &chunks, Mode::Live);

    assert!(report.is_complete());
    assert_eq!(report.failed_entries, 1);
    assert!(report.to_string().contains("unsubmitted=0 mismatches=0"));

    let dry = verify(&log, &chunks, Mode::DryRun);
    assert_eq!(dry.log_entries, 0);
    assert_eq!(dry.unsubmitted_rows(), vec![0, 1]);
}

#[test]
fn digest_mismatch_without_a_recorded_payload_lists_no_fields() {
    let chunks = prepared(1);
    let log = OutcomeLog::in_memory();
    let mut tampered = outcome(0, Mode::Live, ok(), "disagree");
    tampered.payload = None;
    log.append(tampered).unwrap();

    let report = verify(&log, &chunks, Mode::Live);

    assert!(matches!(
        report.mismatches.as_slice(),
        [PayloadMismatch::Digest { row_index: 0, fields, .. }] if fields.is_empty()
    ));
    assert!(report.unsubmitted.is_empty());
}
