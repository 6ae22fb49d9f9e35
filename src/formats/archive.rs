//! Page access for ZIP-family book containers.

use crate::error::{AppError, Result};
use crate::imaging;
use crate::library::BookPage;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Write};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "jxl"];

/// Check if an archive entry name is an image page.
fn is_image_entry(name: &str) -> bool {
    if name.ends_with('/') || name.contains("__MACOSX") {
        return false;
    }
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.rsplit_once('.').is_some_and(|(_, e)| e == *ext))
}

/// Media type implied by an entry name, used when the signature is unknown.
fn media_type_from_name(name: &str) -> String {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "jxl" => "image/jxl",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Image entry names in reading order.
fn page_names(archive: &ZipArchive<File>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| is_image_entry(name))
        .map(String::from)
        .collect();
    names.sort_by(|a, b| natord_compare(a, b));
    names
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    archive.by_name(name)?.read_to_end(&mut data)?;
    Ok(data)
}

/// List the pages of a ZIP-family archive.
///
/// Media type comes from the image signature, dimensions from the header.
pub fn read_pages(path: &Path) -> Result<Vec<BookPage>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let names = page_names(&archive);

    let mut pages = Vec::with_capacity(names.len());
    for name in names {
        let data = read_entry(&mut archive, &name)?;
        let media_type =
            imaging::detect_media_type(&data).unwrap_or_else(|| media_type_from_name(&name));
        let (width, height) = match imaging::dimensions(&data) {
            Some((w, h)) => (Some(w), Some(h)),
            None => (None, None),
        };
        pages.push(BookPage {
            file_name: name,
            media_type,
            width,
            height,
        });
    }

    Ok(pages)
}

/// Read the bytes of one page entry.
pub fn read_page(path: &Path, file_name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    read_entry(&mut archive, file_name)
}

/// Write pages to a new CBZ archive, in the given order.
///
/// Entries are stored uncompressed and renamed with a zero-padded index.
pub fn write_cbz(dest: &Path, pages: &[(String, Vec<u8>)]) -> Result<()> {
    if dest.exists() {
        return Err(AppError::InvalidArgument(format!(
            "Destination already exists: {}",
            dest.display()
        )));
    }

    let width = pages.len().to_string().len().max(3);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut writer = zip::ZipWriter::new(File::create(dest)?);

    for (index, (name, data)) in pages.iter().enumerate() {
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("img");
        let entry = format!("{:0width$}.{}", index + 1, ext, width = width);
        writer.start_file(entry, options)?;
        writer.write_all(data)?;
    }

    writer.finish()?;
    Ok(())
}

fn take_number(chars: &mut Peekable<Chars<'_>>) -> u64 {
    let mut value: u64 = 0;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(u64::from(digit));
        chars.next();
    }
    value
}

/// Natural string comparison for sorting.
pub fn natord_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ac), Some(&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    match take_number(&mut a_chars).cmp(&take_number(&mut b_chars)) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }

                a_chars.next();
                b_chars.next();
                match ac.to_lowercase().cmp(bc.to_lowercase()) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Write a ZIP archive with the given entries.
    pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::write_zip;
    use super::*;
    use crate::imaging::testing::sample_image;
    use crate::library::ImageType;

    #[test]
    fn test_natord_compare() {
        assert_eq!(natord_compare("page1", "page2"), Ordering::Less);
        assert_eq!(natord_compare("page2", "page10"), Ordering::Less);
        assert_eq!(natord_compare("page10", "page2"), Ordering::Greater);
        assert_eq!(natord_compare("p10a", "p10b"), Ordering::Less);
        assert_eq!(natord_compare("Page1", "page1"), Ordering::Equal);
    }

    #[test]
    fn test_is_image_entry() {
        assert!(is_image_entry("001.JPG"));
        assert!(is_image_entry("sub/002.webp"));
        assert!(!is_image_entry("__MACOSX/._001.jpg"));
        assert!(!is_image_entry("ComicInfo.xml"));
        assert!(!is_image_entry("images/"));
    }

    #[test]
    fn test_read_pages_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_zip(
            &path,
            &[
                ("page10.png", sample_image(3, 2, ImageType::Png)),
                ("page2.jpg", sample_image(4, 5, ImageType::Jpeg)),
                ("ComicInfo.xml", b"<ComicInfo/>".to_vec()),
            ],
        );

        let pages = read_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].file_name, "page2.jpg");
        assert_eq!(pages[0].media_type, "image/jpeg");
        assert_eq!((pages[0].width, pages[0].height), (Some(4), Some(5)));
        assert_eq!(pages[1].file_name, "page10.png");
        assert_eq!(pages[1].media_type, "image/png");
    }

    #[test]
    fn test_write_cbz_round_trips_pages() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.cbz");
        let png = sample_image(2, 2, ImageType::Png);
        write_cbz(
            &dest,
            &[("a.png".into(), png.clone()), ("b.png".into(), png.clone())],
        )
        .unwrap();

        let pages = read_pages(&dest).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].file_name, "001.png");
        assert_eq!(read_page(&dest, "002.png").unwrap(), png);

        assert!(write_cbz(&dest, &[]).is_err());
    }
}
