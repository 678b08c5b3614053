use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::zip_util::{normalize_part_name, read_entry_with_budget, Limits, ZipInflateBudget};
use crate::{ArchiveOpenError, ArchiveWriteError};

/// One file entry inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    bytes: Vec<u8>,
    compression: CompressionMethod,
    modified: bool,
}

impl Part {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            compression: CompressionMethod::Deflated,
            modified: false,
        }
    }

    /// Archive-relative path, always using `/` separators (e.g. `xl/worksheets/sheet1.xml`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Compression method the entry is written with. Entries stored uncompressed in the input
    /// stay uncompressed; every other method is written as `Deflated`.
    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replace the part content and mark it (and therefore its document) as modified.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
        self.modified = true;
    }
}

/// An OPC package held in memory: every file entry of the input ZIP in archive order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    parts: Vec<Part>,
}

impl Document {
    pub fn open(path: &Path, limits: Limits) -> Result<Self, ArchiveOpenError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), limits)
    }

    pub fn from_bytes(bytes: &[u8], limits: Limits) -> Result<Self, ArchiveOpenError> {
        Self::from_reader(Cursor::new(bytes), limits)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, limits: Limits) -> Result<Self, ArchiveOpenError> {
        let mut zip = ZipArchive::new(reader)?;

        let mut parts = Vec::with_capacity(zip.len());
        let mut seen = BTreeSet::new();
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }

            let name = normalize_part_name(file.name());
            if !seen.insert(name.clone()) {
                return Err(ArchiveOpenError::DuplicatePart(name));
            }

            let compression = match file.compression() {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let declared_size = file.size();
            let bytes = read_entry_with_budget(
                &mut file,
                declared_size,
                &name,
                limits.max_part_bytes,
                &mut budget,
            )?;

            parts.push(Part {
                name,
                bytes,
                compression,
                modified: false,
            });
        }

        Ok(Self { parts })
    }

    /// Build a document from already-materialized parts (in archive order).
    pub fn from_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter()
    }

    pub(crate) fn parts_mut(&mut self) -> impl Iterator<Item = &mut Part> {
        self.parts.iter_mut()
    }

    pub fn part_names(&self) -> BTreeSet<&str> {
        self.parts.iter().map(|part| part.name()).collect()
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.name == name)
    }

    /// True once any part has been replaced since the package was read.
    pub fn is_modified(&self) -> bool {
        self.parts.iter().any(Part::is_modified)
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, ArchiveWriteError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Serialize every part, in archive order, as a new ZIP package.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), ArchiveWriteError> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);

        for part in &self.parts {
            let options = FileOptions::<()>::default().compression_method(part.compression);
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_zip(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes, method) in entries {
            let options = FileOptions::<()>::default().compression_method(*method);
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_every_file_entry_in_archive_order() {
        let bytes = build_zip(&[
            ("[Content_Types].xml", b"<Types/>", CompressionMethod::Deflated),
            ("xl/workbook.xml", b"<workbook/>", CompressionMethod::Deflated),
            ("docProps/app.xml", b"<Properties/>", CompressionMethod::Stored),
        ]);
        let doc = Document::from_bytes(&bytes, Limits::default()).unwrap();
        let names: Vec<&str> = doc.parts().map(Part::name).collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "xl/workbook.xml", "docProps/app.xml"]
        );
        assert_eq!(doc.part("xl/workbook.xml").unwrap().bytes(), b"<workbook/>");
        assert!(!doc.is_modified());
    }

    #[test]
    fn skips_directory_entries() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory("xl/", FileOptions::<()>::default()).unwrap();
        zip.start_file("xl/workbook.xml", FileOptions::<()>::default())
            .unwrap();
        zip.write_all(b"<workbook/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let doc = Document::from_bytes(&bytes, Limits::default()).unwrap();
        assert_eq!(doc.part_names(), BTreeSet::from(["xl/workbook.xml"]));
    }

    #[test]
    fn normalizes_backslash_separators() {
        let bytes = build_zip(&[(
            "xl\\worksheets\\sheet1.xml",
            b"<worksheet/>",
            CompressionMethod::Deflated,
        )]);
        let doc = Document::from_bytes(&bytes, Limits::default()).unwrap();
        assert!(doc.part("xl/worksheets/sheet1.xml").is_some());
    }

    #[test]
    fn rejects_names_that_collide_after_normalization() {
        let bytes = build_zip(&[
            ("xl/workbook.xml", b"a", CompressionMethod::Deflated),
            ("xl\\workbook.xml", b"b", CompressionMethod::Deflated),
        ]);
        let err = Document::from_bytes(&bytes, Limits::default()).unwrap_err();
        assert!(
            matches!(err, ArchiveOpenError::DuplicatePart(ref name) if name == "xl/workbook.xml"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn rejects_non_zip_input() {
        let err = Document::from_bytes(b"definitely not a zip", Limits::default()).unwrap_err();
        assert!(matches!(err, ArchiveOpenError::Zip(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn enforces_part_limit() {
        let bytes = build_zip(&[("xl/big.bin", &[0u8; 64], CompressionMethod::Deflated)]);
        let limits = Limits {
            max_part_bytes: 32,
            ..Limits::default()
        };
        let err = Document::from_bytes(&bytes, limits).unwrap_err();
        assert!(matches!(err, ArchiveOpenError::PartTooLarge { .. }));
    }

    #[test]
    fn write_preserves_names_bytes_order_and_compression() {
        let input = build_zip(&[
            ("[Content_Types].xml", b"<Types/>", CompressionMethod::Deflated),
            ("xl/media/image1.png", b"\x89PNG", CompressionMethod::Stored),
            ("xl/worksheets/sheet1.xml", b"<worksheet/>", CompressionMethod::Deflated),
        ]);
        let mut doc = Document::from_bytes(&input, Limits::default()).unwrap();
        doc.parts_mut()
            .find(|p| p.name() == "xl/worksheets/sheet1.xml")
            .unwrap()
            .set_bytes(b"<worksheet><dimension/></worksheet>".to_vec());
        assert!(doc.is_modified());

        let out = doc.write_to_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(out.as_slice())).unwrap();
        assert_eq!(
            archive.by_name("xl/media/image1.png").unwrap().compression(),
            CompressionMethod::Stored
        );
        assert_eq!(
            archive.by_name("xl/worksheets/sheet1.xml").unwrap().compression(),
            CompressionMethod::Deflated
        );

        let reread = Document::from_bytes(&out, Limits::default()).unwrap();
        let order: Vec<&str> = reread.parts().map(Part::name).collect();
        assert_eq!(
            order,
            vec![
                "[Content_Types].xml",
                "xl/media/image1.png",
                "xl/worksheets/sheet1.xml"
            ]
        );
        assert_eq!(
            reread.part("xl/worksheets/sheet1.xml").unwrap().bytes(),
            b"<worksheet><dimension/></worksheet>"
        );
        assert_eq!(
            reread.part("xl/media/image1.png").unwrap().bytes(),
            b"\x89PNG"
        );
    }
}
