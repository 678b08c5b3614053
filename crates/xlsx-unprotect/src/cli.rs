use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::batch::{
    run_batch, BatchOptions, BatchReport, FileOutcome, FileReport, SkipReason,
    DEFAULT_OUTPUT_SUFFIX,
};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "xlsx-unprotect",
    about = "Remove worksheet protection from XLSX workbooks, writing an unprotected copy next to each input."
)]
pub struct Args {
    /// Workbooks to unprotect. Inputs are never modified.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Inserted before the extension of each output file (`book.xlsx` -> `book<SUFFIX>.xlsx`).
    #[arg(long, default_value = DEFAULT_OUTPUT_SUFFIX)]
    suffix: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Exit with status 1 if any file failed to open, parse, or write.
    ///
    /// Skipped files (missing, wrong extension, existing output) never affect the exit status.
    #[arg(long)]
    fail_on_error: bool,
}

#[derive(Debug, Serialize)]
struct JsonCounts {
    unprotected: usize,
    unchanged: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct JsonPartEdit<'a> {
    part: &'a str,
    markers_removed: usize,
}

#[derive(Debug, Serialize)]
struct JsonFile<'a> {
    input: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parts: Vec<JsonPartEdit<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    counts: JsonCounts,
    files: Vec<JsonFile<'a>>,
}

pub fn run() -> Result<ExitCode> {
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<ExitCode> {
    if args.suffix.contains(['/', '\\']) {
        bail!(
            "invalid --suffix '{}' (must not contain path separators)",
            args.suffix
        );
    }

    let options = BatchOptions {
        suffix: args.suffix.clone(),
        ..BatchOptions::default()
    };

    let stdout = io::stdout();
    let mut out = StatusWriter::new(stdout.lock());

    let report = match args.format {
        OutputFormat::Text => {
            let mut write_err = None;
            let report = run_batch(&args.files, &options, |file| {
                if write_err.is_none() {
                    if let Err(err) = out.line(format_args!("{file}")) {
                        write_err = Some(err);
                    }
                }
            });
            if let Some(err) = write_err {
                return Err(err.into());
            }
            report
        }
        OutputFormat::Json => {
            let report = run_batch(&args.files, &options, |_| {});
            let json = serde_json::to_string(&json_report(&report))?;
            out.line(format_args!("{json}"))?;
            report
        }
    };

    if args.fail_on_error && report.has_failures() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn json_report(report: &BatchReport) -> JsonReport<'_> {
    JsonReport {
        counts: JsonCounts {
            unprotected: report.unprotected(),
            unchanged: report.unchanged(),
            skipped: report.skipped(),
            failed: report.failed(),
        },
        files: report.files.iter().map(json_file).collect(),
    }
}

fn json_file(file: &FileReport) -> JsonFile<'_> {
    let mut entry = JsonFile {
        input: file.input.to_string_lossy().into_owned(),
        status: "",
        reason: None,
        output: None,
        parts: Vec::new(),
        error: None,
    };
    match &file.outcome {
        FileOutcome::Skipped(reason) => {
            entry.status = "skipped";
            entry.reason = Some(match reason {
                SkipReason::Missing => "missing",
                SkipReason::WrongExtension => "wrong_extension",
                SkipReason::OutputExists(_) => "output_exists",
            });
            if let SkipReason::OutputExists(output) = reason {
                entry.output = Some(output.to_string_lossy().into_owned());
            }
        }
        FileOutcome::Unprotected { output, edits } => {
            entry.status = "unprotected";
            entry.output = Some(output.to_string_lossy().into_owned());
            entry.parts = edits
                .iter()
                .map(|edit| JsonPartEdit {
                    part: edit.part.as_str(),
                    markers_removed: edit.markers_removed,
                })
                .collect();
        }
        FileOutcome::NoProtectionFound => entry.status = "no_protection_found",
        FileOutcome::Failed { kind, message } => {
            entry.status = "failed";
            entry.reason = Some(kind.as_str());
            entry.error = Some(message.as_str());
        }
    }
    entry
}

/// Line-oriented stdout writer that goes quiet once the reader hangs up.
///
/// A closed pipe (e.g. `xlsx-unprotect *.xlsx | head -1`) must not abort the batch: the remaining
/// files still get processed, their status lines are just dropped.
struct StatusWriter<W: Write> {
    inner: W,
    closed: bool,
}

impl<W: Write> StatusWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        match writeln!(self.inner, "{args}").and_then(|()| self.inner.flush()) {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Ok(())
            }
            other => other,
        }
    }
}
