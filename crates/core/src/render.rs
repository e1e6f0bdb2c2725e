//! Annotated disassembly rendering for bytecode comparisons.
//!
//! Every row starts with a marker so the plain rendering stays readable in log files:
//! ` ` identical, `!` differing, `~` differing inside an immutable slot, `+` present only in
//! the actual code, `-` present only in the expected code.

use crate::decoder::Instruction;
use owo_colors::OwoColorize;
use std::fmt::Write;
use veriscan_utils::errors::CompareError;

/// Width of the mnemonic column.
const MNEMONIC_WIDTH: usize = 14;

/// Classification of a single rendered row, with the instructions it shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind<'a> {
    /// Both sides hold the same instruction.
    Same(&'a Instruction),
    /// Both sides hold an instruction and they differ.
    Differs {
        actual: &'a Instruction,
        expected: &'a Instruction,
        immutable: bool,
    },
    /// Only the actual code reaches this index.
    ActualOnly(&'a Instruction),
    /// Only the expected code reaches this index.
    ExpectedOnly(&'a Instruction),
}

/// One row of the annotated diff.
#[derive(Clone, Debug)]
pub struct Row<'a> {
    pub index: usize,
    pub kind: RowKind<'a>,
}

impl<'a> Row<'a> {
    /// Classifies the instructions both streams hold at `index`.
    ///
    /// An index present in neither stream is [`CompareError::InvalidDifferenceData`].
    pub fn classify(
        index: usize,
        actual: Option<&'a Instruction>,
        expected: Option<&'a Instruction>,
        immutable: bool,
    ) -> Result<Self, CompareError> {
        let kind = match (actual, expected) {
            (Some(a), Some(e)) if a.same_bytes(e) => RowKind::Same(a),
            (Some(actual), Some(expected)) => RowKind::Differs {
                actual,
                expected,
                immutable,
            },
            (Some(a), None) => RowKind::ActualOnly(a),
            (None, Some(e)) => RowKind::ExpectedOnly(e),
            (None, None) => return Err(CompareError::InvalidDifferenceData(index)),
        };
        Ok(Self { index, kind })
    }
}

/// A comparison rendered twice, with and without ANSI colors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedDiff {
    pub plain: String,
    pub colored: String,
}

impl RenderedDiff {
    /// Picks the colored or plain variant.
    pub fn text(&self, color: bool) -> &str {
        if color { &self.colored } else { &self.plain }
    }
}

#[derive(Clone, Copy)]
enum Paint {
    ActualDiffers,
    Immutable,
    Expected,
    ExpectedOnly,
    ActualOnly,
}

fn paint(text: &str, style: Paint, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match style {
        Paint::ActualDiffers => text.white().on_red().to_string(),
        Paint::Immutable => text.black().on_yellow().to_string(),
        Paint::Expected => text.black().on_green().to_string(),
        Paint::ExpectedOnly => text.red().to_string(),
        Paint::ActualOnly => text.green().to_string(),
    }
}

fn cells(ins: &Instruction) -> (String, String, String) {
    (
        format!("{:02X}", ins.opcode),
        format!("{:<width$}", ins.mnemonic, width = MNEMONIC_WIDTH),
        ins.imm_hex(),
    )
}

fn render_row(row: &Row<'_>, color: bool) -> String {
    match row.kind {
        RowKind::Same(ins) => {
            let (op, name, imm) = cells(ins);
            format!("  {:04X} {op} {name} {imm}", row.index)
        }
        RowKind::Differs {
            actual,
            expected,
            immutable,
        } => {
            let style = if immutable {
                Paint::Immutable
            } else {
                Paint::ActualDiffers
            };
            let marker = if immutable { '~' } else { '!' };
            let (a_op, a_name, a_imm) = cells(actual);
            let (e_op, e_name, e_imm) = cells(expected);

            let op = if actual.opcode != expected.opcode {
                paint(&a_op, style, color)
            } else {
                a_op
            };
            let name = if actual.mnemonic != expected.mnemonic {
                paint(&a_name, style, color)
            } else {
                a_name
            };
            let imm = if actual.imm != expected.imm {
                paint(&a_imm, style, color)
            } else {
                a_imm
            };
            let wanted = paint(
                format!("{e_op} {} {e_imm}", e_name.trim_end()).trim_end(),
                Paint::Expected,
                color,
            );
            format!("{marker} {:04X} {op} {name} {imm} | expected {wanted}", row.index)
        }
        RowKind::ActualOnly(ins) => {
            let (op, name, imm) = cells(ins);
            let line = format!("{op} {name} {imm}");
            format!("+ {:04X} {}", row.index, paint(&line, Paint::ActualOnly, color))
        }
        RowKind::ExpectedOnly(ins) => {
            let (op, name, imm) = cells(ins);
            let line = format!("{op} {name} {imm}");
            format!("- {:04X} {}", row.index, paint(&line, Paint::ExpectedOnly, color))
        }
    }
}

/// Explains the row markers and colors.
pub fn legend(color: bool) -> String {
    format!(
        "Legend: {}  {}  {}  {}  {}",
        paint("! actual differs", Paint::ActualDiffers, color),
        paint("~ immutable slot", Paint::Immutable, color),
        paint("expected value", Paint::Expected, color),
        paint("- missing in actual", Paint::ExpectedOnly, color),
        paint("+ only in actual", Paint::ActualOnly, color),
    )
}

/// Renders rows in order, inserting `...` wherever consecutive indices are not adjacent.
pub fn render(rows: &[Row<'_>], color: bool) -> String {
    let mut out = legend(color);
    out.push('\n');
    let mut prev: Option<usize> = None;
    for row in rows {
        let gap = match prev {
            Some(p) => row.index > p + 1,
            None => row.index > 0,
        };
        if gap {
            out.push_str("...\n");
        }
        let _ = writeln!(out, "{}", render_row(row, color).trim_end());
        prev = Some(row.index);
    }
    out
}

/// Renders the plain and colored variants in one go.
pub fn render_both(rows: &[Row<'_>]) -> RenderedDiff {
    RenderedDiff {
        plain: render(rows, false),
        colored: render(rows, true),
    }
}
