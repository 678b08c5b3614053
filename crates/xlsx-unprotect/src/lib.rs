//! Remove worksheet protection from XLSX packages.
//!
//! This crate operates at the ZIP/Open Packaging Convention layer: a workbook is read into a
//! [`Document`] (every ZIP entry as a named part), `<sheetProtection>` elements are spliced out of
//! the worksheet parts, and the package is written back as a new file. Parts that were not edited
//! are copied through byte-for-byte.
//!
//! Only the structural protection flag is removed. Encrypted workbooks are not zip packages and
//! are rejected when opened.

pub mod batch;
pub mod cli;
mod error;
mod fs;
pub mod package;
pub mod protection;
mod xml;
mod zip_util;

use std::path::Path;

pub use batch::{
    process_file, run_batch, unprotected_output_path, BatchOptions, BatchReport, FailureKind,
    FileOutcome, FileReport, SkipReason,
};
pub use error::{
    ArchiveOpenError, ArchiveWriteError, MalformedPartError, UnprotectError, XmlError,
};
pub use package::{Document, Part};
pub use protection::{
    is_worksheet_part, remove_protection_markers, unprotect_document, EditSummary, MarkerOptions,
    PartEdit, SHEET_PROTECTION_TAG,
};
pub use zip_util::{Limits, DEFAULT_MAX_ZIP_PART_BYTES, DEFAULT_MAX_ZIP_TOTAL_BYTES};

/// Write `doc` as a new package at `dest`.
///
/// Fails with [`UnprotectError::OutputExists`] instead of replacing an existing file. On any
/// other failure no file is left at `dest`.
pub fn save_document(doc: &Document, dest: &Path) -> Result<(), UnprotectError> {
    fs::write_new_file(dest, |w| doc.write_to(w)).map_err(|err| match err {
        fs::WriteNewError::AlreadyExists => UnprotectError::OutputExists(dest.to_path_buf()),
        fs::WriteNewError::Io(err) => UnprotectError::ArchiveWrite {
            path: dest.to_path_buf(),
            source: err.into(),
        },
        fs::WriteNewError::Writer(source) => UnprotectError::ArchiveWrite {
            path: dest.to_path_buf(),
            source,
        },
    })
}

/// Strip protection markers from the workbook at `input` and save the result at `output`.
///
/// When no marker is found nothing is written and the returned summary is empty.
pub fn unprotect_file(
    input: &Path,
    output: &Path,
    markers: &MarkerOptions,
    limits: Limits,
) -> Result<EditSummary, UnprotectError> {
    let mut doc = Document::open(input, limits)?;
    let summary = unprotect_document(&mut doc, markers)?;
    if doc.is_modified() {
        save_document(&doc, output)?;
    }
    Ok(summary)
}
