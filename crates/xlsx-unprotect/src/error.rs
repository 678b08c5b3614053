use std::path::PathBuf;

use thiserror::Error;

/// Failure to read an input file as a zip package.
#[derive(Debug, Error)]
pub enum ArchiveOpenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("duplicate part name after normalization (possible invalid zip): {0}")]
    DuplicatePart(String),
    #[error("package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// Failure to decode or parse the text of a single XML part.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("utf-16 error: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),
    #[error("invalid UTF-16 byte length: {0}")]
    OddUtf16Length(usize),
    #[error("xml error: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// A worksheet part that could not be parsed, which makes the whole package unsafe to repack.
#[derive(Debug, Error)]
#[error("worksheet part {part} is not well-formed: {source}")]
pub struct MalformedPartError {
    pub part: String,
    #[source]
    pub source: XmlError,
}

/// Failure while producing the output package.
#[derive(Debug, Error)]
pub enum ArchiveWriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Error type for the single-file pipeline ([`crate::unprotect_file`] and [`crate::save_document`]).
#[derive(Debug, Error)]
pub enum UnprotectError {
    #[error("could not open archive: {0}")]
    ArchiveOpen(#[from] ArchiveOpenError),
    #[error(transparent)]
    MalformedPart(#[from] MalformedPartError),
    #[error("output file {} already exists", .0.display())]
    OutputExists(PathBuf),
    #[error("could not write archive {}: {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: ArchiveWriteError,
    },
}
