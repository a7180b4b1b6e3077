use formpost_core::{resolve, HeaderMapping, MappingError, Payload, Row};
use pretty_assertions::assert_eq;

fn init_logging() {
    pipeline_logging::initialize_for_tests();
}

fn survey_mapping() -> HeaderMapping {
    HeaderMapping::new([
        ("Name", "entry.24240767"),
        ("Department", "entry.283251996"),
        ("Email", "emailAddress"),
    ])
    .unwrap()
}

fn row(index: usize, cells: &[(&str, &str)]) -> Row {
    Row::new(
        index,
        cells
            .iter()
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn resolves_headers_to_field_ids_in_mapping_order() {
    init_logging();
    let row = row(
        4,
        &[
            ("Email", "a@example.com"),
            ("Name", "Asha"),
            ("Department", "CSE"),
        ],
    );

    let resolved = resolve(&row, &survey_mapping()).unwrap();

    assert_eq!(resolved.row_index, 4);
    assert_eq!(
        resolved.payload,
        Payload::from_pairs([
            ("entry.24240767", "Asha"),
            ("entry.283251996", "CSE"),
            ("emailAddress", "a@example.com"),
        ])
    );
}

#[test]
fn unmapped_header_is_rejected_by_name() {
    let mapping = HeaderMapping::new([("Name", "entry.1")]).unwrap();
    let row = row(2, &[("Name", "Asha"), ("Email", "a@example.com")]);

    let err = resolve(&row, &mapping).unwrap_err();
    assert_eq!(
        err,
        MappingError::UnmappedHeader {
            header: "Email".into(),
            row: 2
        }
    );
    assert_eq!(err.header(), "Email");
}

#[test]
fn unmapped_header_fails_every_row_and_the_header_check() {
    let mapping = HeaderMapping::new([("Name", "entry.1")]).unwrap();
    for index in 0..5 {
        let row = row(index, &[("Name", "x"), ("Email", "x@example.com")]);
        assert!(matches!(
            resolve(&row, &mapping),
            Err(MappingError::UnmappedHeader { ref header, row })
                if header == "Email" && row == index
        ));
    }
    let err = mapping.check_headers(["Name", "Email"]).unwrap_err();
    assert_eq!(err.header(), "Email");
}

#[test]
fn absent_optional_header_becomes_empty_value() {
    let row = row(0, &[("Name", "Asha")]);
    let resolved = resolve(&row, &survey_mapping()).unwrap();
    assert_eq!(resolved.payload.get("entry.283251996"), Some(""));
    assert_eq!(resolved.payload.get("emailAddress"), Some(""));
}

#[test]
fn absent_required_header_is_an_error() {
    let mapping = survey_mapping().require("Email").unwrap();
    let row = row(7, &[("Name", "Asha"), ("Department", "CSE")]);

    assert_eq!(
        resolve(&row, &mapping).unwrap_err(),
        MappingError::MissingRequiredField {
            header: "Email".into(),
            row: 7
        }
    );
}

#[test]
fn ignored_headers_are_not_submitted() {
    let mapping = survey_mapping().ignore("Notes");
    let row = row(
        1,
        &[("Name", "Asha"), ("Notes", "call back later"), ("Email", "a@x.io")],
    );

    let resolved = resolve(&row, &mapping).unwrap();
    assert_eq!(resolved.payload.len(), 3);
    assert!(resolved.payload.iter().all(|(_, v)| v != "call back later"));
    assert!(mapping.check_headers(["Name", "Notes"]).is_ok());
}

#[test]
fn duplicate_entries_are_rejected_at_construction() {
    assert_eq!(
        HeaderMapping::new([("Name", "entry.1"), ("Name", "entry.2")]).unwrap_err(),
        MappingError::DuplicateHeader("Name".into())
    );
    assert_eq!(
        HeaderMapping::new([("Name", "entry.1"), ("Full name", "entry.1")]).unwrap_err(),
        MappingError::DuplicateFieldId("entry.1".into())
    );
    assert_eq!(
        survey_mapping().require("Phone").unwrap_err(),
        MappingError::UnknownHeader("Phone".into())
    );
}

#[test]
fn resolve_is_deterministic() {
    let mapping = survey_mapping();
    let row = row(3, &[("Name", "Asha"), ("Email", "a@x.io")]);
    let first = resolve(&row, &mapping).unwrap();
    let second = resolve(&row, &mapping).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.payload.digest(), second.payload.digest());
}

#[test]
fn schema_flags_blank_required_and_unknown_fields() {
    let mapping = survey_mapping().require("Email").unwrap();
    let schema = mapping.schema();

    let ok = Payload::from_pairs([("entry.24240767", "Asha"), ("emailAddress", "a@x.io")]);
    assert_eq!(schema.check(&ok), (vec![], vec![]));

    let bad = Payload::from_pairs([("emailAddress", "  "), ("entry.999", "?")]);
    assert_eq!(
        schema.check(&bad),
        (vec!["emailAddress".to_string()], vec!["entry.999".to_string()])
    );
}

#[test]
fn placeholder_ids_are_reported() {
    let mapping =
        HeaderMapping::new([("Name", "entry.YOUR_ENTRY_ID_HERE"), ("Email", "emailAddress")])
            .unwrap();
    assert_eq!(mapping.placeholder_field_ids(), vec!["entry.YOUR_ENTRY_ID_HERE"]);
    assert!(survey_mapping().placeholder_field_ids().is_empty());
}
