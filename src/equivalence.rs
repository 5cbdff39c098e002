//! Checks that a freshly built API dump matches the checked-in one.

use std::{
    borrow::Cow,
    fmt::Write as _,
    fs,
    io::Error,
    path::{Path, PathBuf},
};

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum EquivalenceError {
    #[error("Failed To Read Dump {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("{message}")]
    Mismatch { message: String },
}

/// The outcome of comparing two dumps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Equivalence {
    Match,
    /// The dumps differ. Holds a short, never empty, summary of the difference.
    Mismatch(String),
}

impl Equivalence {
    pub fn is_match(&self) -> bool {
        matches!(self, Equivalence::Match)
    }
}

/// The number of changed lines shown before a diff summary is cut off.
pub const DEFAULT_MAX_DIFF_LINES: usize = 8;

const CONTEXT_LINES: usize = 2;

/// Above this many table cells the changed region is reported as a whole instead of line by line.
const MAX_DIFF_TABLE_CELLS: usize = 1 << 20;

fn read_dump(path: &Path) -> Result<Vec<u8>, EquivalenceError> {
    fs::read(path).map_err(|source| EquivalenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Compares the two files byte for byte.
pub fn compare(checked_in: impl AsRef<Path>, built: impl AsRef<Path>) -> Result<Equivalence, EquivalenceError> {
    let (checked_in, built) = (checked_in.as_ref(), built.as_ref());
    log::debug!("Comparing {} against {}", built.display(), checked_in.display());

    let expected = read_dump(checked_in)?;
    let actual = read_dump(built)?;

    Ok(compare_contents(&expected, &actual))
}

/// Compares two dumps already in memory.
pub fn compare_contents(expected: &[u8], actual: &[u8]) -> Equivalence {
    if expected == actual {
        return Equivalence::Match;
    }

    Equivalence::Mismatch(summarize_diff(expected, actual, DEFAULT_MAX_DIFF_LINES))
}

/// Fails with a message naming the update task if the two files differ.
pub fn check_equal(checked_in: impl AsRef<Path>, built: impl AsRef<Path>, update_task: &str) -> Result<(), EquivalenceError> {
    let (checked_in, built) = (checked_in.as_ref(), built.as_ref());

    match compare(checked_in, built)? {
        Equivalence::Match => Ok(()),
        Equivalence::Mismatch(diff) => {
            log::debug!("{} differs from {}", built.display(), checked_in.display());
            Err(EquivalenceError::Mismatch {
                message: format!(
                    "ABI definition has changed\n\n\
                     Declared definition is {}\n\
                     True     definition is {}\n\n\
                     Please run `{}` to confirm these changes are\n\
                     intentional by updating the ABI definition.\n\n\
                     Difference between these files:\n{}",
                    checked_in.display(),
                    built.display(),
                    update_task,
                    diff
                ),
            })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DiffLine<'a> {
    Context(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Returns the edit script turning `expected` into `actual`, from a longest common subsequence table.
fn diff_lines<'a>(expected: &[&'a str], actual: &[&'a str]) -> Vec<DiffLine<'a>> {
    let (rows, columns) = (expected.len(), actual.len());

    if (rows + 1).saturating_mul(columns + 1) > MAX_DIFF_TABLE_CELLS {
        return expected
            .iter()
            .copied()
            .map(DiffLine::Removed)
            .chain(actual.iter().copied().map(DiffLine::Added))
            .collect();
    }

    let width = columns + 1;
    let mut lengths = vec![0u32; (rows + 1) * width];
    for row in (0..rows).rev() {
        for column in (0..columns).rev() {
            lengths[row * width + column] = if expected[row] == actual[column] {
                lengths[(row + 1) * width + column + 1] + 1
            } else {
                lengths[(row + 1) * width + column].max(lengths[row * width + column + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(rows + columns);
    let (mut row, mut column) = (0, 0);
    while row < rows && column < columns {
        if expected[row] == actual[column] {
            lines.push(DiffLine::Context(expected[row]));
            row += 1;
            column += 1;
        } else if lengths[(row + 1) * width + column] >= lengths[row * width + column + 1] {
            lines.push(DiffLine::Removed(expected[row]));
            row += 1;
        } else {
            lines.push(DiffLine::Added(actual[column]));
            column += 1;
        }
    }
    lines.extend(expected[row..].iter().copied().map(DiffLine::Removed));
    lines.extend(actual[column..].iter().copied().map(DiffLine::Added));
    lines
}

fn push_line(summary: &mut String, marker: char, line: &str) {
    summary.push(marker);
    match line.strip_suffix('\n') {
        Some(line) => {
            summary.push_str(line);
            summary.push('\n');
        }
        None => {
            summary.push_str(line);
            summary.push_str("\n\\ No newline at end of file\n");
        }
    }
}

/// Summarizes how `actual` differs from `expected` as a unified style diff.
///
/// At most `max_diff_lines` removed or added lines are shown. The summary is empty only when the inputs are equal.
pub fn summarize_diff(expected: &[u8], actual: &[u8], max_diff_lines: usize) -> String {
    if expected == actual {
        return String::new();
    }

    let (expected_text, actual_text): (Cow<str>, Cow<str>) = (String::from_utf8_lossy(expected), String::from_utf8_lossy(actual));
    let expected_lines: Vec<&str> = expected_text.split_inclusive('\n').collect();
    let actual_lines: Vec<&str> = actual_text.split_inclusive('\n').collect();

    let prefix = expected_lines.iter().zip(&actual_lines).take_while(|(left, right)| left == right).count();
    let suffix = expected_lines[prefix..]
        .iter()
        .rev()
        .zip(actual_lines[prefix..].iter().rev())
        .take_while(|(left, right)| left == right)
        .count();

    let changed_expected = &expected_lines[prefix..expected_lines.len() - suffix];
    let changed_actual = &actual_lines[prefix..actual_lines.len() - suffix];

    if changed_expected.is_empty() && changed_actual.is_empty() {
        let offset = expected.iter().zip(actual).position(|(left, right)| left != right).unwrap_or(expected.len().min(actual.len()));
        return format!("Files differ at byte offset {} ({} bytes vs {} bytes)\n", offset, expected.len(), actual.len());
    }

    let context_start = prefix.saturating_sub(CONTEXT_LINES);
    let context_end = (expected_lines.len() - suffix + CONTEXT_LINES).min(expected_lines.len());
    let trailing_context = context_end - (expected_lines.len() - suffix);

    let expected_count = context_end - context_start;
    let actual_count = (prefix - context_start) + changed_actual.len() + trailing_context;

    let mut summary = String::new();
    let _ = writeln!(summary, "--- checked-in");
    let _ = writeln!(summary, "+++ built");
    let _ = writeln!(
        summary,
        "@@ -{},{} +{},{} @@",
        context_start + 1,
        expected_count,
        context_start + 1,
        actual_count
    );

    for line in &expected_lines[context_start..prefix] {
        push_line(&mut summary, ' ', line);
    }

    let diff = diff_lines(changed_expected, changed_actual);
    let total_changes = diff.iter().filter(|line| !matches!(line, DiffLine::Context(_))).count();
    let mut shown_changes = 0;

    for line in diff {
        if shown_changes == max_diff_lines {
            break;
        }

        match line {
            DiffLine::Context(line) => push_line(&mut summary, ' ', line),
            DiffLine::Removed(line) => {
                push_line(&mut summary, '-', line);
                shown_changes += 1;
            }
            DiffLine::Added(line) => {
                push_line(&mut summary, '+', line);
                shown_changes += 1;
            }
        }
    }

    if shown_changes < total_changes {
        let _ = writeln!(summary, "... {} more lines", total_changes - shown_changes);
    } else {
        for line in &expected_lines[expected_lines.len() - suffix..context_end] {
            push_line(&mut summary, ' ', line);
        }
    }

    summary
}

/// A build step that fails when the built ABI dump no longer matches the checked-in one.
#[derive(Clone, Debug)]
pub struct CheckAbiEquivalence {
    checked_in_dump: PathBuf,
    built_dump: PathBuf,
    update_task: String,
}

impl CheckAbiEquivalence {
    pub const DEFAULT_UPDATE_TASK: &str = "updateAbi";

    pub fn new(checked_in_dump: impl Into<PathBuf>, built_dump: impl Into<PathBuf>) -> Self {
        Self {
            checked_in_dump: checked_in_dump.into(),
            built_dump: built_dump.into(),
            update_task: String::from(Self::DEFAULT_UPDATE_TASK),
        }
    }

    /// Sets the task named in the failure message.
    pub fn update_task(mut self, update_task: impl Into<String>) -> Self {
        self.update_task = update_task.into();
        self
    }

    pub fn checked_in_dump(&self) -> &Path {
        &self.checked_in_dump
    }

    pub fn built_dump(&self) -> &Path {
        &self.built_dump
    }

    pub fn execute(&self) -> Result<(), EquivalenceError> {
        check_equal(&self.checked_in_dump, &self.built_dump, &self.update_task)
    }
}
