use veriscan_core::compare::{CompareOptions, display_indices};
use veriscan_core::strip::{LITERAL_GUARD, trim_hex};
use veriscan_core::{BytecodeComparator, ImmutableReferences, Verdict, compare};
use veriscan_utils::errors::CompareError;

/// CBOR metadata trailer as emitted by solc 0.8.9, including the two length bytes.
fn metadata(ipfs_fill: &str) -> String {
    format!(
        "a264697066735822{}{}64736f6c63430008090033",
        "1220",
        ipfs_fill.repeat(32)
    )
}

fn ascii_hex(text: &str) -> String {
    hex::encode(text.as_bytes())
}

#[test]
fn metadata_trailers_are_ignored() {
    let code = "608060405260043610";
    let actual = format!("0x{code}{}", metadata("aa"));
    let expected = format!("0x{code}{}", metadata("bb"));

    let trimmed = trim_hex(&actual).unwrap();
    assert_eq!(trimmed.code_hex(), code);
    assert_eq!(trimmed.metadata.len(), 53);

    assert_eq!(
        compare(&actual, &expected, &ImmutableReferences::new()).unwrap(),
        Verdict::FullMatch
    );
}

#[test]
fn push32_immutable_is_tolerated() {
    // PUSH32 <slot>, POP, STOP, with the slot at bytes 1..33 of the expected code
    let actual = format!("0x7f{}5000{}", "11".repeat(32), metadata("aa"));
    let expected = format!("0x7f{}5000{}", "00".repeat(32), metadata("aa"));
    let immutables: ImmutableReferences = [(1, 32)].into_iter().collect();

    let comparison = BytecodeComparator::default()
        .evaluate(&actual, &expected, &immutables)
        .unwrap();
    assert_eq!(comparison.verdict, Verdict::ImmutableOnlyMismatch);
    assert_eq!(comparison.immutable_mismatches, vec![0]);
    assert!(comparison.real_mismatches.is_empty());

    let diff = comparison.diff.as_ref().unwrap();
    assert!(diff.plain.lines().any(|l| l.starts_with('~')));
    assert!(comparison.into_result().is_ok());
}

#[test]
fn changed_opcode_outside_slot_fails() {
    let actual = format!("0x600160005500{}", metadata("aa"));
    let expected = format!("0x600160015500{}", metadata("aa"));
    let immutables: ImmutableReferences = [(100, 32)].into_iter().collect();

    let err = compare(&actual, &expected, &immutables).unwrap_err();
    assert!(matches!(err, CompareError::NotOnImmutable { count: 1 }));
    assert!(
        err.to_string()
            .contains("not on the immutable reference position")
    );
}

#[test]
fn length_skew_fails_even_when_prefix_matches() {
    let err = compare(
        "0x6001600055fe",
        "0x6001600055fe6001",
        &ImmutableReferences::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompareError::DifferentLength {
            actual: 4,
            expected: 5
        }
    ));

    let comparison = BytecodeComparator::default()
        .evaluate(
            "0x6001600055fe",
            "0x6001600055fe6001",
            &ImmutableReferences::new(),
        )
        .unwrap();
    let diff = comparison.diff.unwrap();
    assert!(diff.plain.lines().any(|l| l.starts_with('-')));
}

#[test]
fn appended_string_literals_must_agree() {
    let guard = hex::encode(LITERAL_GUARD);
    let actual = format!(
        "0x6001{guard}{}{}",
        ascii_hex("v1.0.0"),
        metadata("aa")
    );
    let expected = format!(
        "0x6001{guard}{}{}",
        ascii_hex("v1.0.1"),
        metadata("aa")
    );

    let trimmed = trim_hex(&actual).unwrap();
    assert_eq!(trimmed.string_literal, "v1.0.0");
    assert!(trimmed.code_hex().ends_with(&guard));

    let err = compare(&actual, &expected, &ImmutableReferences::new()).unwrap_err();
    assert!(matches!(err, CompareError::StringLiteral { .. }));
}

#[test]
fn wide_context_covers_everything() {
    let comparator = BytecodeComparator::new(CompareOptions { context: 100 });
    let comparison = comparator
        .evaluate("0x6001600260036004fe", "0x6001600260056004fe", &ImmutableReferences::new())
        .unwrap();
    let diff = comparison.diff.unwrap();
    assert!(!diff.plain.contains("..."));
    assert_eq!(display_indices(&[2], 5, 5, 100).len(), 5);
}
