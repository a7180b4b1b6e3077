use formpost_core::{
    build, NormalizationNote, NormalizationRules, NormalizeError, Payload, ResolvedRow,
};
use pretty_assertions::assert_eq;

const LIKERT: [&str; 5] = [
    "Strongly Agree",
    "Agree",
    "Neutral",
    "Disagree",
    "Strongly Disagree",
];

fn resolved(row_index: usize, pairs: &[(&str, &str)]) -> ResolvedRow {
    ResolvedRow {
        row_index,
        payload: Payload::from_pairs(pairs.iter().copied()),
    }
}

#[test]
fn trims_whitespace_on_every_field() {
    let input = resolved(0, &[("entry.1", "  Asha  "), ("entry.2", "\tCSE\n")]);
    let built = build(&input, &NormalizationRules::new()).unwrap();
    assert_eq!(
        built.payload,
        Payload::from_pairs([("entry.1", "Asha"), ("entry.2", "CSE")])
    );
    assert!(built.notes.is_empty());
}

#[test]
fn choice_values_match_case_insensitively_with_a_note() {
    let rules = NormalizationRules::new().with_choices("entry.9", LIKERT);
    let input = resolved(3, &[("entry.9", "strongly Agree")]);

    let built = build(&input, &rules).unwrap();

    assert_eq!(built.payload.get("entry.9"), Some("Strongly Agree"));
    assert_eq!(
        built.notes,
        vec![NormalizationNote::Canonicalized {
            row: 3,
            field: "entry.9".into(),
            from: "strongly Agree".into(),
            to: "Strongly Agree".into(),
        }]
    );
}

#[test]
fn exact_choice_produces_no_note() {
    let rules = NormalizationRules::new().with_choices("entry.9", LIKERT);
    let built = build(&resolved(0, &[("entry.9", " Agree ")]), &rules).unwrap();
    assert_eq!(built.payload.get("entry.9"), Some("Agree"));
    assert!(built.notes.is_empty());
}

#[test]
fn aliases_prefer_the_longest_prefix() {
    let rules = NormalizationRules::new()
        .with_choices("entry.9", LIKERT)
        .with_alias("entry.9", "strongly", "Strongly Agree")
        .with_alias("entry.9", "strongly disagree", "Strongly Disagree")
        .with_alias("entry.9", "neither", "Neutral");

    let cases = [
        ("Strongly", "Strongly Agree"),
        ("strongly disagree!!", "Strongly Disagree"),
        ("Neither agree nor disagree", "Neutral"),
    ];
    for (raw, expected) in cases {
        let built = build(&resolved(0, &[("entry.9", raw)]), &rules).unwrap();
        assert_eq!(built.payload.get("entry.9"), Some(expected), "input {raw:?}");
    }
}

#[test]
fn unknown_choice_falls_back_to_raw_value_with_warning() {
    let rules = NormalizationRules::new().with_choices("entry.9", LIKERT);
    let built = build(&resolved(1, &[("entry.9", " Sometimes ")]), &rules).unwrap();

    assert_eq!(built.payload.get("entry.9"), Some("Sometimes"));
    assert_eq!(
        built.notes,
        vec![NormalizationNote::Unmatched {
            row: 1,
            field: "entry.9".into(),
            value: "Sometimes".into(),
        }]
    );
}

#[test]
fn empty_answers_skip_canonicalization() {
    let rules = NormalizationRules::new().with_choices("entry.9", LIKERT);
    let built = build(&resolved(0, &[("entry.9", "   ")]), &rules).unwrap();
    assert_eq!(built.payload.get("entry.9"), Some(""));
    assert!(built.notes.is_empty());
}

#[test]
fn overlong_value_is_rejected_after_trimming() {
    let rules = NormalizationRules::new().with_max_length("entry.1", 5);

    assert!(build(&resolved(0, &[("entry.1", "  abcde  ")]), &rules).is_ok());
    assert_eq!(
        build(&resolved(8, &[("entry.1", "abcdef")]), &rules).unwrap_err(),
        NormalizeError::ValueTooLong {
            row: 8,
            field: "entry.1".into(),
            length: 6,
            max: 5,
        }
    );
}

#[test]
fn build_leaves_input_untouched() {
    let rules = NormalizationRules::new().with_choices("entry.9", LIKERT);
    let input = resolved(0, &[("entry.9", " agree ")]);
    let before = input.clone();
    let _ = build(&input, &rules).unwrap();
    assert_eq!(input, before);
}
