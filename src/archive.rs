//! Single-entry compressed archives for backup and restore.
//!
//! An archive holds exactly one file, `store.json`: a JSON object mapping
//! every store key to its raw document, written without indentation.
//! Restore accepts any valid JSON document of that shape.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde_json::{Map, Value};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::{LarderError, Result};

/// Extension of an archive file: JSON in a zip.
pub const ARCHIVE_EXT: &str = "jaz";

const STORE_ENTRY: &str = "store.json";

/// Writes the whole key→document mapping to a compressed archive,
/// overwriting any archive already at `path`.
pub fn write_archive(path: &Path, entries: &Map<String, Value>) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(STORE_ENTRY, options)?;
    zip.write_all(serde_json::to_string(entries)?.as_bytes())?;
    zip.finish()?;
    Ok(())
}

/// Reads the key→document mapping back out of an archive.
pub fn read_archive(path: &Path) -> Result<Map<String, Value>> {
    if !path.is_file() {
        return Err(LarderError::MissingArchive {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    let mut entry = zip.by_name(STORE_ENTRY)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(LarderError::Archive(
            "archived store is not a JSON object".to_owned(),
        )),
    }
}
