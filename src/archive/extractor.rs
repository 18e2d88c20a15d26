use std::io::{Cursor, Read};

use crate::error::ArchiveError;

const KMZ_CONTENT_TYPE: &str = "application/vnd.google-earth.kmz";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &str = "\u{feff}";

/// Raw bytes of an uploaded route file. Only lives for the duration of one upload.
#[derive(Debug, Clone)]
pub struct RouteDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl RouteDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the payload should be opened as a zip archive. The extension and content type
    /// are trusted first, then the zip magic catches KMZ files uploaded under a `.kml` name.
    pub fn is_kmz(&self) -> bool {
        has_extension(&self.filename, "kmz")
            || self
                .content_type
                .as_deref()
                .is_some_and(|mime| mime.eq_ignore_ascii_case(KMZ_CONTENT_TYPE))
            || self.bytes.starts_with(ZIP_MAGIC)
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Return the KML text held by `document`, unzipping it first when it is a KMZ.
pub fn extract_kml(document: &RouteDocument) -> Result<String, ArchiveError> {
    if document.is_kmz() {
        extract_from_kmz(&document.bytes)
    } else {
        decode_utf8(document.bytes.clone())
    }
}

/// When an archive holds several KML entries the first one in the central directory wins.
fn extract_from_kmz(bytes: &[u8]) -> Result<String, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;

    let mut kml_indices = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
        if !entry.is_dir() && has_extension(entry.name(), "kml") {
            kml_indices.push(index);
        }
    }
    let entry_index = *kml_indices.first().ok_or(ArchiveError::NoKmlEntry)?;
    if kml_indices.len() > 1 {
        log::warn!(
            "Archive holds {} KML entries, using the first one",
            kml_indices.len()
        );
    }

    let mut entry = archive
        .by_index(entry_index)
        .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
    log::debug!("Reading KML entry {} from archive", entry.name());
    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut contents)
        .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
    decode_utf8(contents)
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, ArchiveError> {
    let text = String::from_utf8(bytes).map_err(|_| ArchiveError::InvalidUtf8)?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}
