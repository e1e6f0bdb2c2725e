//! Structural comparison of deployed bytecode against the bytecode it should match.
//!
//! Both sides are trimmed of solc trailers, decoded, and paired instruction by instruction.
//! Differences are tolerated only where the *expected* instruction overlaps an immutable
//! reference slot, since those bytes are filled in at deploy time.

use crate::decoder::{Decoded, decode_bytes};
use crate::render::{self, RenderedDiff, Row};
use crate::strip::{TrimmedBytecode, trim};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};
use veriscan_utils::errors::CompareError;

/// Default number of neighbouring instructions shown around each difference.
pub const DEFAULT_CONTEXT: usize = 3;

/// Byte regions of the expected code that may legitimately differ, as `start -> length`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImmutableReferences(BTreeMap<usize, usize>);

impl ImmutableReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, start: usize, length: usize) {
        self.0.insert(start, length);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&s, &l)| (s, l))
    }

    /// True if `[start, start + len)` intersects any region.
    pub fn overlaps(&self, start: usize, len: usize) -> bool {
        self.0
            .range(..start + len)
            .any(|(&s, &l)| start < s + l)
    }

    /// Flattens solc's `immutableReferences` object.
    ///
    /// The compiler groups slots by AST id: `{"12": [{"start": 10, "length": 32}, ...]}`.
    /// Entries missing either field are skipped.
    pub fn from_compiler_output(value: &serde_json::Value) -> Self {
        let mut refs = Self::new();
        let Some(groups) = value.as_object() else {
            return refs;
        };
        for slot in groups.values().filter_map(|v| v.as_array()).flatten() {
            let start = slot.get("start").and_then(|v| v.as_u64());
            let length = slot.get("length").and_then(|v| v.as_u64());
            if let (Some(start), Some(length)) = (start, length) {
                refs.insert(start as usize, length as usize);
            }
        }
        refs
    }
}

impl FromIterator<(usize, usize)> for ImmutableReferences {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome class of a comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    FullMatch,
    ImmutableOnlyMismatch,
    RealMismatch,
}

/// Tuning for the comparator.
#[derive(Clone, Debug)]
pub struct CompareOptions {
    /// Instructions shown on each side of a checkpoint.
    pub context: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT,
        }
    }
}

/// Everything learned from comparing one pair of bytecodes.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub verdict: Verdict,
    pub actual_len: usize,
    pub expected_len: usize,
    /// Paired indices tolerated because they touch an immutable slot.
    pub immutable_mismatches: Vec<usize>,
    /// Paired indices that differ outside every immutable slot.
    pub real_mismatches: Vec<usize>,
    pub unknown_opcodes: BTreeSet<String>,
    pub actual_literal: String,
    pub expected_literal: String,
    /// Annotated diff; `None` on a full match.
    pub diff: Option<RenderedDiff>,
}

impl Comparison {
    pub fn length_mismatch(&self) -> bool {
        self.actual_len != self.expected_len
    }

    pub fn literal_mismatch(&self) -> bool {
        !self.actual_literal.is_empty()
            && !self.expected_literal.is_empty()
            && self.actual_literal != self.expected_literal
    }

    /// The error describing why this comparison fails, if it does.
    pub fn failure(&self) -> Option<CompareError> {
        if self.length_mismatch() {
            Some(CompareError::DifferentLength {
                actual: self.actual_len,
                expected: self.expected_len,
            })
        } else if !self.real_mismatches.is_empty() {
            Some(CompareError::NotOnImmutable {
                count: self.real_mismatches.len(),
            })
        } else if self.literal_mismatch() {
            Some(CompareError::StringLiteral {
                actual: self.actual_literal.clone(),
                expected: self.expected_literal.clone(),
            })
        } else {
            None
        }
    }

    /// Converts a failing comparison into its error.
    pub fn into_result(self) -> Result<Verdict, CompareError> {
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(self.verdict),
        }
    }
}

/// Comparator holding the rendering options.
#[derive(Clone, Debug, Default)]
pub struct BytecodeComparator {
    options: CompareOptions,
}

impl BytecodeComparator {
    pub fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    /// Compares two hex bytecodes and returns the full comparison record.
    ///
    /// # Arguments
    /// * `actual` - Bytecode observed on chain.
    /// * `expected` - Bytecode the source should produce.
    /// * `immutables` - Immutable slots of `expected`.
    ///
    /// # Returns
    /// The comparison; mismatches are recorded in it rather than returned as errors. Only
    /// malformed hex or inconsistent rendering data fail.
    pub fn evaluate(
        &self,
        actual: &str,
        expected: &str,
        immutables: &ImmutableReferences,
    ) -> Result<Comparison, CompareError> {
        let actual = trim_side("actual", actual)?;
        let expected = trim_side("expected", expected)?;

        let actual_code = decode_bytes(&actual.code);
        let expected_code = decode_bytes(&expected.code);

        let unknown_opcodes: BTreeSet<String> = actual_code
            .unknown_opcodes
            .union(&expected_code.unknown_opcodes)
            .cloned()
            .collect();
        if !unknown_opcodes.is_empty() {
            warn!(opcodes = ?unknown_opcodes, "bytecode contains unknown opcodes");
        }

        let (a, e) = (&actual_code.instructions, &expected_code.instructions);
        if a.len() != e.len() {
            warn!(
                actual = a.len(),
                expected = e.len(),
                "bytecodes have different length"
            );
        }

        let mismatches: Vec<usize> = a
            .iter()
            .zip(e.iter())
            .enumerate()
            .filter(|(_, (x, y))| !x.same_bytes(y))
            .map(|(i, _)| i)
            .collect();

        let (immutable_mismatches, real_mismatches): (Vec<usize>, Vec<usize>) = mismatches
            .iter()
            .partition(|&&i| immutables.overlaps(e[i].pc, e[i].len()));

        let diff = if mismatches.is_empty() && a.len() == e.len() {
            None
        } else {
            let indices = display_indices(&mismatches, a.len(), e.len(), self.options.context);
            let tolerated: BTreeSet<usize> = immutable_mismatches.iter().copied().collect();
            let rows = build_rows(&indices, &actual_code, &expected_code, &tolerated)?;
            Some(render::render_both(&rows))
        };

        let mut comparison = Comparison {
            verdict: Verdict::FullMatch,
            actual_len: a.len(),
            expected_len: e.len(),
            immutable_mismatches,
            real_mismatches,
            unknown_opcodes,
            actual_literal: actual.string_literal,
            expected_literal: expected.string_literal,
            diff,
        };
        comparison.verdict = if comparison.length_mismatch()
            || !comparison.real_mismatches.is_empty()
            || comparison.literal_mismatch()
        {
            Verdict::RealMismatch
        } else if !comparison.immutable_mismatches.is_empty() {
            Verdict::ImmutableOnlyMismatch
        } else {
            Verdict::FullMatch
        };

        if comparison.literal_mismatch() {
            error!(
                actual = %comparison.actual_literal,
                expected = %comparison.expected_literal,
                "string literals differ"
            );
        }
        debug!(
            verdict = ?comparison.verdict,
            immutable = comparison.immutable_mismatches.len(),
            real = comparison.real_mismatches.len(),
            "bytecode comparison finished"
        );
        Ok(comparison)
    }
}

/// Compares two hex bytecodes with default options, logging the annotated diff.
///
/// # Returns
/// `FullMatch` or `ImmutableOnlyMismatch`; a real mismatch is returned as the
/// [`CompareError`] naming its cause.
pub fn compare(
    actual: &str,
    expected: &str,
    immutables: &ImmutableReferences,
) -> Result<Verdict, CompareError> {
    let comparison = BytecodeComparator::default().evaluate(actual, expected, immutables)?;
    match (&comparison.diff, comparison.verdict) {
        (None, _) => info!("bytecodes fully match"),
        (Some(diff), Verdict::ImmutableOnlyMismatch) => {
            info!("\n{}", diff.plain);
            info!("bytecodes differ only on immutable reference positions");
        }
        (Some(diff), _) => info!("\n{}", diff.plain),
    }
    comparison.into_result()
}

fn trim_side(side: &str, bytecode: &str) -> Result<TrimmedBytecode, CompareError> {
    let bytes = crate::decoder::input_to_bytes(bytecode, false)?;
    let trimmed = trim(&bytes);
    if trimmed.has_metadata() {
        info!(
            side,
            metadata = %trimmed.metadata_hex(),
            "trimmed metadata trailer"
        );
    }
    if trimmed.has_string_literal() {
        info!(side, literal = %trimmed.string_literal, "trimmed string literal");
    }
    Ok(trimmed)
}

/// Indices to render: every mismatch, the first index and the last index of each stream,
/// widened once by `context` on both sides within the paired range.
pub fn display_indices(
    mismatches: &[usize],
    actual_len: usize,
    expected_len: usize,
    context: usize,
) -> BTreeSet<usize> {
    let mut checkpoints: BTreeSet<usize> = mismatches.iter().copied().collect();
    checkpoints.insert(0);
    for len in [actual_len, expected_len] {
        if let Some(last) = len.checked_sub(1) {
            checkpoints.insert(last);
        }
    }

    let paired = actual_len.min(expected_len);
    if paired > 0 {
        let snapshot: Vec<usize> = checkpoints.iter().copied().collect();
        for ind in snapshot {
            let lo = ind.saturating_sub(context);
            let hi = ind.saturating_add(context).min(paired - 1);
            if lo <= hi {
                checkpoints.extend(lo..=hi);
            }
        }
    }
    checkpoints
}

fn build_rows<'a>(
    indices: &BTreeSet<usize>,
    actual: &'a Decoded,
    expected: &'a Decoded,
    tolerated: &BTreeSet<usize>,
) -> Result<Vec<Row<'a>>, CompareError> {
    indices
        .iter()
        .map(|&index| {
            Row::classify(
                index,
                actual.instructions.get(index),
                expected.instructions.get(index),
                tolerated.contains(&index),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(pairs: &[(usize, usize)]) -> ImmutableReferences {
        pairs.iter().copied().collect()
    }

    #[test]
    fn identical_code_fully_matches() {
        let code = "0x608060405234801561001057600080fd5b50";
        assert_eq!(
            compare(code, code, &ImmutableReferences::new()).unwrap(),
            Verdict::FullMatch
        );
    }

    #[test]
    fn operand_inside_immutable_slot_is_tolerated() {
        let verdict = compare("0x6001fe", "0x6002fe", &refs(&[(1, 1)])).unwrap();
        assert_eq!(verdict, Verdict::ImmutableOnlyMismatch);
    }

    #[test]
    fn mismatch_outside_immutable_slot_fails() {
        let err = compare("0x6001fe", "0x6001fd", &ImmutableReferences::new()).unwrap_err();
        assert!(
            err.to_string()
                .contains("differences not on the immutable reference position")
        );
    }

    #[test]
    fn length_mismatch_is_always_fatal() {
        let err = compare(
            "0x6001600055fe",
            "0x6001600055fe6001",
            &ImmutableReferences::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("different length"));
    }

    #[test]
    fn overlap_is_half_open() {
        let r = refs(&[(10, 4)]);
        assert!(r.overlaps(8, 3));
        assert!(r.overlaps(13, 1));
        assert!(!r.overlaps(14, 2));
        assert!(!r.overlaps(6, 4));
    }

    #[test]
    fn display_set_includes_context_and_ends() {
        let set = display_indices(&[10], 20, 20, 3);
        let expected: BTreeSet<usize> = [0, 1, 2, 3, 7, 8, 9, 10, 11, 12, 13, 16, 17, 18, 19]
            .into_iter()
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn display_set_keeps_unpaired_tail_end() {
        let set = display_indices(&[], 3, 6, 3);
        assert!(set.contains(&5));
        assert!(!set.contains(&4));
        assert!(set.contains(&2));
    }

    #[test]
    fn compiler_immutables_are_flattened() {
        let json = serde_json::json!({
            "7": [{"start": 120, "length": 32}, {"start": 300, "length": 32}],
            "9": [{"start": 40, "length": 32}]
        });
        let r = ImmutableReferences::from_compiler_output(&json);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![(40, 32), (120, 32), (300, 32)]);
    }

    #[test]
    fn differing_literals_fail() {
        let comparator = BytecodeComparator::default();
        // guard + "a" / "b" + metadata 0x0000
        let c = comparator
            .evaluate("0x5b5056fe610000", "0x5b5056fe620000", &ImmutableReferences::new())
            .unwrap();
        assert_eq!(c.verdict, Verdict::RealMismatch);
        assert!(matches!(c.failure(), Some(CompareError::StringLiteral { .. })));
    }
}
