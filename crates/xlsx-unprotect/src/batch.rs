//! Batch driver: runs the unprotect pipeline over a list of input files.
//!
//! Every input ends in exactly one [`FileOutcome`]. A failure on one file never stops the batch.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::package::Document;
use crate::protection::{unprotect_document, MarkerOptions, PartEdit};
use crate::zip_util::Limits;
use crate::{save_document, UnprotectError};

/// The only input extension accepted by the batch driver.
pub const XLSX_EXTENSION: &str = "xlsx";

/// Inserted between the input's file stem and its extension to name the output file.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "-unprotected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub suffix: String,
    pub markers: MarkerOptions,
    pub limits: Limits,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            markers: MarkerOptions::default(),
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    WrongExtension,
    OutputExists(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The input is not a readable zip package.
    Open,
    /// A worksheet part is not well-formed XML.
    MalformedPart,
    /// The output package could not be written.
    Write,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Open => "open",
            FailureKind::MalformedPart => "malformed_part",
            FailureKind::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped(SkipReason),
    Unprotected {
        output: PathBuf,
        edits: Vec<PartEdit>,
    },
    NoProtectionFound,
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl FileOutcome {
    fn failed(kind: FailureKind, err: impl fmt::Display) -> Self {
        FileOutcome::Failed {
            kind,
            message: err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub input: PathBuf,
    pub outcome: FileOutcome,
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = self.input.display();
        match &self.outcome {
            FileOutcome::Skipped(SkipReason::Missing) => {
                write!(f, "Skipping non-existing file {input}")
            }
            FileOutcome::Skipped(SkipReason::WrongExtension) => {
                write!(f, "Only XLSX files are supported. Skipping {input}")
            }
            FileOutcome::Skipped(SkipReason::OutputExists(output)) => write!(
                f,
                "Unprotected file {} already exists. Skipping.",
                output.display()
            ),
            FileOutcome::Unprotected { output, edits } => write!(
                f,
                "Unprotected {input} -> {} ({} worksheet{})",
                output.display(),
                edits.len(),
                if edits.len() == 1 { "" } else { "s" }
            ),
            FileOutcome::NoProtectionFound => {
                write!(f, "No sheet protection found in {input}. Skipping.")
            }
            FileOutcome::Failed {
                kind: FailureKind::Open,
                message,
            } => write!(f, "Could not open {input} ({message}). Skipping."),
            FileOutcome::Failed {
                kind: FailureKind::MalformedPart,
                message,
            } => write!(f, "Could not parse {input} ({message}). Skipping."),
            FileOutcome::Failed {
                kind: FailureKind::Write,
                message,
            } => write!(
                f,
                "Can't write unprotected copy of {input} ({message}). Skipping."
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn unprotected(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Unprotected { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::NoProtectionFound))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failure)
    }

    pub fn has_failures(&self) -> bool {
        self.files.iter().any(|file| file.outcome.is_failure())
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|file| pred(&file.outcome)).count()
    }
}

/// Output path for an unprotected copy of `input`: same directory, `<stem><suffix>.<ext>`.
pub fn unprotected_output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = input.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Run the full pipeline for one input file.
pub fn process_file(input: &Path, options: &BatchOptions) -> FileOutcome {
    if !input.exists() {
        return FileOutcome::Skipped(SkipReason::Missing);
    }
    if input.extension() != Some(OsStr::new(XLSX_EXTENSION)) {
        return FileOutcome::Skipped(SkipReason::WrongExtension);
    }

    let mut doc = match Document::open(input, options.limits) {
        Ok(doc) => doc,
        Err(err) => return FileOutcome::failed(FailureKind::Open, err),
    };

    let summary = match unprotect_document(&mut doc, &options.markers) {
        Ok(summary) => summary,
        Err(err) => return FileOutcome::failed(FailureKind::MalformedPart, err),
    };
    if !doc.is_modified() {
        return FileOutcome::NoProtectionFound;
    }

    let output = unprotected_output_path(input, &options.suffix);
    if output.exists() {
        return FileOutcome::Skipped(SkipReason::OutputExists(output));
    }

    let saved = save_document(&doc, &output);
    publish_outcome(saved, output, summary.edits)
}

/// Losing the race for `output` to another writer counts as a skip, not a failure.
fn publish_outcome(
    saved: Result<(), UnprotectError>,
    output: PathBuf,
    edits: Vec<PartEdit>,
) -> FileOutcome {
    match saved {
        Ok(()) => FileOutcome::Unprotected { output, edits },
        Err(UnprotectError::OutputExists(output)) => {
            FileOutcome::Skipped(SkipReason::OutputExists(output))
        }
        Err(err) => FileOutcome::failed(FailureKind::Write, err),
    }
}

/// Process `inputs` in order, calling `on_file` as soon as each file is done.
pub fn run_batch<P: AsRef<Path>>(
    inputs: impl IntoIterator<Item = P>,
    options: &BatchOptions,
    mut on_file: impl FnMut(&FileReport),
) -> BatchReport {
    let mut report = BatchReport::default();
    for input in inputs {
        let input = input.as_ref();
        let file = FileReport {
            input: input.to_path_buf(),
            outcome: process_file(input, options),
        };
        match &file.outcome {
            FileOutcome::Failed { .. } => info!("{file}"),
            _ => debug!("{file}"),
        }
        on_file(&file);
        report.files.push(file);
    }
    report
}
