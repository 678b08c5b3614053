//! Output file publishing.
//!
//! New files are written to a temp file in the destination directory (avoids cross-device
//! renames), flushed and synced, then linked into place without replacing anything that already
//! exists. The temp file is deleted on every error path.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::Builder;

#[derive(Debug)]
pub(crate) enum WriteNewError<E> {
    /// The destination already exists (either before writing started or by the time the new file
    /// was published).
    AlreadyExists,
    Io(io::Error),
    Writer(E),
}

impl<E> From<io::Error> for WriteNewError<E> {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub(crate) fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative file names like `foo.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Create `dest` with the content produced by `write_fn`, never replacing an existing file.
///
/// If `write_fn` (or any I/O step) fails, nothing is left at `dest` or beside it.
pub(crate) fn write_new_file<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut dyn Write) -> Result<T, E>,
) -> Result<T, WriteNewError<E>> {
    let dest = dest.as_ref();
    if dest.try_exists()? {
        return Err(WriteNewError::AlreadyExists);
    }

    let dir = parent_dir_or_dot(dest);
    let mut tmp = Builder::new()
        .prefix(".xlsx-unprotect-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let out = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let out = write_fn(&mut writer).map_err(WriteNewError::Writer)?;
        writer.flush()?;
        out
    };
    tmp.as_file().sync_all()?;

    match tmp.persist_noclobber(dest) {
        Ok(_) => {}
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            return Err(WriteNewError::AlreadyExists);
        }
        Err(err) => return Err(WriteNewError::Io(err.error)),
    }

    // Best-effort: the file is already in place.
    let _ = File::open(dir).and_then(|d| d.sync_all());

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_entries(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("dir entry").path())
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn writes_new_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("out.bin");

        write_new_file(&dest, |w| w.write_all(b"hello")).expect("write new file");

        assert_eq!(std::fs::read(&dest).expect("read dest"), b"hello");
        assert_eq!(dir_entries(tmp.path()), vec![dest]);
    }

    #[test]
    fn refuses_to_replace_existing_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("existing.bin");
        std::fs::write(&dest, b"sentinel").expect("write sentinel");

        let err = write_new_file(&dest, |w| w.write_all(b"new")).expect_err("must not overwrite");
        assert!(matches!(err, WriteNewError::AlreadyExists));
        assert_eq!(std::fs::read(&dest).expect("read dest"), b"sentinel");
        assert_eq!(dir_entries(tmp.path()), vec![dest]);
    }

    #[test]
    fn does_not_clobber_file_created_while_writing() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("out.bin");

        let err = write_new_file(&dest, |w| {
            std::fs::write(&dest, b"racer")?;
            w.write_all(b"mine")
        })
        .expect_err("must not replace a file created concurrently");

        assert!(matches!(err, WriteNewError::AlreadyExists));
        assert_eq!(std::fs::read(&dest).expect("read dest"), b"racer");
        assert_eq!(
            dir_entries(tmp.path()),
            vec![dest],
            "expected no temp files to remain"
        );
    }

    #[test]
    fn removes_temp_file_when_writer_fails() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("out.bin");

        let err = write_new_file(&dest, |w| {
            w.write_all(b"partial")?;
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated write failure"))
        })
        .expect_err("expected writer error");

        assert!(matches!(err, WriteNewError::Writer(_)));
        assert!(!dest.exists());
        assert!(
            dir_entries(tmp.path()).is_empty(),
            "expected no temp files to remain"
        );
    }

    #[test]
    fn parent_dir_of_bare_file_name_is_current_dir() {
        assert_eq!(parent_dir_or_dot(Path::new("book.xlsx")), Path::new("."));
        assert_eq!(parent_dir_or_dot(Path::new("a/book.xlsx")), Path::new("a"));
    }
}
