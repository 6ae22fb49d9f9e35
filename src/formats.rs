//! Book container detection and archive access.

mod archive;
pub mod jxl;

pub use archive::{natord_compare, read_page, read_pages, write_cbz};

#[cfg(test)]
pub(crate) use archive::testing as archive_testing;

use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];
const PDF_MAGIC: &[u8] = b"%PDF";

// An OCF container stores an uncompressed `mimetype` entry first.
const EPUB_MIMETYPE_NAME: &[u8] = b"mimetype";
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Container format of a book file, detected from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// ZIP archive (CBZ).
    Zip,
    /// EPUB publication.
    Epub,
    /// RAR archive (CBR).
    Rar,
    /// 7-Zip archive (CB7).
    SevenZip,
    /// PDF document.
    Pdf,
}

impl Container {
    /// Detect the container from the first bytes of a file.
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(ZIP_MAGIC) {
            let is_epub = header.get(30..38) == Some(EPUB_MIMETYPE_NAME)
                && header.get(38..58) == Some(EPUB_MIMETYPE);
            return Some(if is_epub {
                Container::Epub
            } else {
                Container::Zip
            });
        }
        if header.starts_with(RAR_MAGIC) {
            return Some(Container::Rar);
        }
        if header.starts_with(SEVEN_ZIP_MAGIC) {
            return Some(Container::SevenZip);
        }
        if header.starts_with(PDF_MAGIC) {
            return Some(Container::Pdf);
        }
        None
    }

    /// Detect the container of a file on disk.
    pub fn detect(path: &Path) -> Result<Option<Self>> {
        let mut header = Vec::with_capacity(64);
        File::open(path)?.take(64).read_to_end(&mut header)?;
        Ok(Self::from_magic(&header))
    }

    /// Detect the container from a media type string.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        [
            Container::Zip,
            Container::Epub,
            Container::Rar,
            Container::SevenZip,
            Container::Pdf,
        ]
        .into_iter()
        .find(|c| c.media_type() == media_type)
    }

    /// MIME type stored on analyzed media.
    pub fn media_type(&self) -> &'static str {
        match self {
            Container::Zip => "application/zip",
            Container::Epub => "application/epub+zip",
            Container::Rar => "application/x-rar-compressed",
            Container::SevenZip => "application/x-7z-compressed",
            Container::Pdf => "application/pdf",
        }
    }

    /// Extension a file of this container should carry.
    pub fn canonical_extension(&self) -> &'static str {
        match self {
            Container::Zip => "cbz",
            Container::Epub => "epub",
            Container::Rar => "cbr",
            Container::SevenZip => "cb7",
            Container::Pdf => "pdf",
        }
    }

    /// Whether `extension` is acceptable for this container.
    pub fn matches_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        match self {
            Container::Zip => matches!(extension.as_str(), "cbz" | "zip"),
            Container::Epub => extension == "epub",
            Container::Rar => matches!(extension.as_str(), "cbr" | "rar"),
            Container::SevenZip => matches!(extension.as_str(), "cb7" | "7z"),
            Container::Pdf => extension == "pdf",
        }
    }

    /// Whether pages can be read with the ZIP reader.
    pub fn is_zip_family(&self) -> bool {
        matches!(self, Container::Zip | Container::Epub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epub_header() -> Vec<u8> {
        let mut header = ZIP_MAGIC.to_vec();
        header.resize(30, 0);
        header.extend_from_slice(EPUB_MIMETYPE_NAME);
        header.extend_from_slice(EPUB_MIMETYPE);
        header
    }

    #[test]
    fn test_from_magic() {
        assert_eq!(Container::from_magic(b"PK\x03\x04rest"), Some(Container::Zip));
        assert_eq!(Container::from_magic(&epub_header()), Some(Container::Epub));
        assert_eq!(Container::from_magic(b"Rar!\x1a\x07\x00"), Some(Container::Rar));
        assert_eq!(Container::from_magic(b"%PDF-1.7"), Some(Container::Pdf));
        assert_eq!(
            Container::from_magic(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0x00]),
            Some(Container::SevenZip)
        );
        assert_eq!(Container::from_magic(b"plain text"), None);
        assert_eq!(Container::from_magic(b""), None);
    }

    #[test]
    fn test_matches_extension() {
        assert!(Container::Zip.matches_extension("CBZ"));
        assert!(Container::Zip.matches_extension("zip"));
        assert!(!Container::Zip.matches_extension("cbr"));
        assert!(Container::Rar.matches_extension("cbr"));
        assert_eq!(Container::Rar.canonical_extension(), "cbr");
    }

    #[test]
    fn test_from_media_type() {
        assert_eq!(
            Container::from_media_type("application/epub+zip"),
            Some(Container::Epub)
        );
        assert_eq!(Container::from_media_type("text/plain"), None);
    }

    #[test]
    fn test_detect_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbr");
        std::fs::write(&path, b"PK\x03\x04 not really rar").unwrap();
        assert_eq!(Container::detect(&path).unwrap(), Some(Container::Zip));
    }
}
