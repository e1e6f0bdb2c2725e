//! Textual diff of explorer sources against the repository, with per-file HTML reports.

use crate::config::Config;
use crate::explorer::ContractSource;
use crate::github::{SourceHost, path_without_dependency, resolve_dep};
use crate::VerificationResult;
use imara_diff::{Diff, InternedInput, Interner, Token, UnifiedDiffPrinter};
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Body diffed against when the repository has no such file.
pub const MISSING_FILE_PLACEHOLDER: &str = "<!-- No file content -->";

/// Line counts of one source diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub hunks: usize,
    pub added: usize,
    pub removed: usize,
}

impl DiffStats {
    /// Lines that differ on either side.
    pub fn changed(&self) -> usize {
        self.added + self.removed
    }
}

/// Diff of one file, repository side first.
#[derive(Debug, Clone)]
pub struct SourceDiff {
    pub unified: String,
    pub stats: DiffStats,
}

/// One row of the per-contract report table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// 1-based position in the explorer's file list
    pub index: usize,
    pub filename: String,
    /// Path as reported by the explorer
    pub path: String,
    pub found: bool,
    pub diffs: usize,
    /// First segment of the explorer path, e.g. `contracts` or `@openzeppelin`
    pub origin: String,
    pub report_path: PathBuf,
}

/// Result of diffing every file of one contract.
#[derive(Debug, Clone, Default)]
pub struct SourceDiffReport {
    pub files: Vec<FileDiff>,
    /// Repository contents by explorer path, for the files that were found
    pub fetched: IndexMap<String, String>,
}

impl SourceDiffReport {
    pub fn found(&self) -> usize {
        self.files.iter().filter(|f| f.found).count()
    }

    pub fn identical(&self) -> usize {
        self.files.iter().filter(|f| f.found && f.diffs == 0).count()
    }

    pub fn is_clean(&self) -> bool {
        self.files.iter().all(|f| f.found && f.diffs == 0)
    }
}

#[derive(Debug, Clone)]
pub struct SourceDiffOptions {
    /// Search the repository by file name when the direct path is missing
    pub recursive: bool,
    /// Run directory; reports go to `{digest_dir}/diffs/{address}/`
    pub digest_dir: PathBuf,
}

struct PlainPrinter<'a> {
    interner: &'a Interner<&'a str>,
}

impl UnifiedDiffPrinter for PlainPrinter<'_> {
    fn display_header(
        &self,
        mut f: impl fmt::Write,
        start_before: u32,
        start_after: u32,
        len_before: u32,
        len_after: u32,
    ) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            start_before + 1,
            len_before,
            start_after + 1,
            len_after
        )
    }

    fn display_context_token(&self, mut f: impl fmt::Write, token: Token) -> fmt::Result {
        let line = self.interner[token];
        write!(f, " {line}")?;
        if !line.ends_with('\n') {
            writeln!(f)?;
        }
        Ok(())
    }

    fn display_hunk(
        &self,
        mut f: impl fmt::Write,
        before: &[Token],
        after: &[Token],
    ) -> fmt::Result {
        for (sign, tokens) in [('-', before), ('+', after)] {
            for &token in tokens {
                let line = self.interner[token];
                write!(f, "{sign}{line}")?;
                if !line.ends_with('\n') {
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

/// Line diff from the repository copy to the explorer copy.
pub fn diff_sources(repository: &str, explorer: &str, context: u32) -> SourceDiff {
    let input = InternedInput::new(repository, explorer);
    let mut diff = Diff::compute(imara_diff::Algorithm::Histogram, &input);
    diff.postprocess_lines(&input);

    let mut config = imara_diff::UnifiedDiffConfig::default();
    config.context_len(context);
    let printer = PlainPrinter {
        interner: &input.interner,
    };
    let unified = diff.unified_diff(&printer, config, &input).to_string();

    let hunks: Vec<_> = diff.hunks().collect();
    SourceDiff {
        unified,
        stats: DiffStats {
            hunks: hunks.len(),
            added: hunks.iter().map(|h| h.after.len()).sum(),
            removed: hunks.iter().map(|h| h.before.len()).sum(),
        },
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Standalone HTML page showing a unified diff.
pub fn render_html(title: &str, diff: &SourceDiff) -> String {
    let mut html = String::new();
    let title = escape_html(title);
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\nbody {{ font-family: monospace; }}\n\
         .add {{ background: #aaffaa; }}\n.del {{ background: #ffaaaa; }}\n\
         .hunk {{ color: #0066aa; }}\npre {{ margin: 0; }}\n</style>\n</head>\n<body>\n\
         <h3>{title}</h3>\n<p>{} added, {} removed, {} hunks (repository &rarr; explorer)</p>\n",
        diff.stats.added, diff.stats.removed, diff.stats.hunks
    );
    if diff.unified.is_empty() {
        html.push_str("<p>No differences.</p>\n");
    }
    for line in diff.unified.lines() {
        let class = match line.chars().next() {
            Some('+') => "add",
            Some('-') => "del",
            Some('@') => "hunk",
            _ => "ctx",
        };
        let _ = writeln!(html, "<pre class=\"{class}\">{}</pre>", escape_html(line));
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// Writes the report for `filename` under `{digest_dir}/diffs/{address}/`.
pub fn write_report(
    digest_dir: &Path,
    address: &str,
    filename: &str,
    html: &str,
) -> VerificationResult<PathBuf> {
    let dir = digest_dir.join("diffs").join(address);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{filename}.html"));
    std::fs::write(&path, html)?;
    Ok(path)
}

/// Diffs every explorer file of `source` against the configured repositories.
pub async fn run_source_diff(
    host: &dyn SourceHost,
    config: &Config,
    address: &str,
    source: &ContractSource,
    options: &SourceDiffOptions,
) -> VerificationResult<SourceDiffReport> {
    let total = source.solc_input.sources.len();
    let mut report = SourceDiffReport::default();

    for (i, (path, file)) in source.solc_input.sources.iter().enumerate() {
        let index = i + 1;
        let origin = path.split('/').next().unwrap_or(path).to_string();
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        info!("File {index} / {total}: {filename}");

        let (repo, repo_path) = match resolve_dep(path, &config.dependencies) {
            Some((dep_name, repo)) => (repo, path_without_dependency(path, dep_name)),
            None => (&config.github_repo, path.as_str()),
        };

        let fetched = host.fetch(repo, repo_path, options.recursive).await?;
        let found = fetched.is_some();
        if !found {
            warn!(path = %path, "file not found in repository");
        }
        let repository_text = fetched.as_deref().unwrap_or(MISSING_FILE_PLACEHOLDER);

        let diff = diff_sources(repository_text, &file.content, 3);
        let html = render_html(path, &diff);
        let report_path = write_report(&options.digest_dir, address, &filename, &html)?;

        if let Some(content) = fetched {
            report.fetched.insert(path.clone(), content);
        }
        report.files.push(FileDiff {
            index,
            filename,
            path: path.clone(),
            found,
            diffs: diff.stats.changed(),
            origin,
            report_path,
        });
    }

    info!("Files found: {} / {total}", report.found());
    info!("Identical files: {} / {}", report.identical(), report.found());
    Ok(report)
}

/// Aligned table of report rows; mismatching rows are highlighted when `color` is set.
pub fn render_report_table(files: &[FileDiff], color: bool) -> String {
    let header = ["#", "Filename", "Found", "Diffs", "Origin", "Report"];
    let rows: Vec<[String; 6]> = files
        .iter()
        .map(|f| {
            [
                f.index.to_string(),
                f.filename.clone(),
                f.found.to_string(),
                f.diffs.to_string(),
                f.origin.clone(),
                f.report_path.display().to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    out.push_str(&format_row(&header[..]));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for (row, file) in rows.iter().zip(files) {
        let line = format_row(&row[..]);
        if !color {
            out.push_str(&line);
        } else if !file.found {
            let _ = write!(out, "{}", line.red());
        } else if file.diffs > 0 {
            let _ = write!(out, "{}", line.yellow());
        } else {
            let _ = write!(out, "{}", line.green());
        }
        out.push('\n');
    }
    out
}
