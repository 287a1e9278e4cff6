//! On-disk store format.
//!
//! ```text
//! "SMST" | format: u16 LE | header_len: u32 LE | header (MessagePack) | body (MessagePack)
//! ```
//!
//! The header carries the schema version, so a store's version can be
//! discovered by reading only the first few bytes of the file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use crate::catalog::SchemaVersion;
use crate::core::{MigrateError, Record, Result};

pub const STORE_MAGIC: &[u8; 4] = b"SMST";
pub const STORE_FORMAT_VERSION: u16 = 1;

const PREAMBLE_LEN: usize = 4 + 2 + 4;

/// Records grouped by entity name.
pub type EntityRecords = BTreeMap<String, Vec<Record>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub schema_version: SchemaVersion,
    pub written_at_unix_ms: i64,
    pub record_count: usize,
    #[serde(default)]
    pub entity_counts: BTreeMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct StoreBody {
    entities: EntityRecords,
}

/// Decoded contents of a store file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDocument {
    pub schema_version: SchemaVersion,
    pub entities: EntityRecords,
}

impl StoreDocument {
    pub fn new(schema_version: impl Into<SchemaVersion>) -> Self {
        Self {
            schema_version: schema_version.into(),
            entities: EntityRecords::new(),
        }
    }

    pub fn with_records(mut self, entity: impl Into<String>, records: Vec<Record>) -> Self {
        self.entities.entry(entity.into()).or_default().extend(records);
        self
    }

    pub fn insert(&mut self, entity: impl Into<String>, record: Record) {
        self.entities.entry(entity.into()).or_default().push(record);
    }

    pub fn records(&self, entity: &str) -> &[Record] {
        self.entities.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    fn header(&self) -> StoreHeader {
        StoreHeader {
            schema_version: self.schema_version.clone(),
            written_at_unix_ms: Utc::now().timestamp_millis(),
            record_count: self.record_count(),
            entity_counts: self
                .entities
                .iter()
                .map(|(name, records)| (name.clone(), records.len()))
                .collect(),
        }
    }
}

pub fn encode(document: &StoreDocument) -> Result<Vec<u8>> {
    let header = rmp_serde::to_vec_named(&document.header())
        .map_err(|e| MigrateError::FormatError(format!("Failed to serialize store header: {}", e)))?;
    let body = rmp_serde::to_vec_named(&StoreBody { entities: document.entities.clone() })
        .map_err(|e| MigrateError::FormatError(format!("Failed to serialize store body: {}", e)))?;

    let header_len = u32::try_from(header.len())
        .map_err(|_| MigrateError::FormatError("Store header exceeds 4 GiB".to_string()))?;

    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + header.len() + body.len());
    bytes.extend_from_slice(STORE_MAGIC);
    bytes.extend_from_slice(&STORE_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<(StoreHeader, StoreDocument)> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(MigrateError::FormatError("Store file is truncated".to_string()));
    }
    let header_len = check_preamble(&bytes[..PREAMBLE_LEN])?;
    let header_end = PREAMBLE_LEN
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| MigrateError::FormatError("Store header is truncated".to_string()))?;

    let header: StoreHeader = rmp_serde::from_slice(&bytes[PREAMBLE_LEN..header_end])
        .map_err(|e| MigrateError::FormatError(format!("Failed to deserialize store header: {}", e)))?;
    let body: StoreBody = rmp_serde::from_slice(&bytes[header_end..])
        .map_err(|e| MigrateError::FormatError(format!("Failed to deserialize store body: {}", e)))?;

    let document = StoreDocument {
        schema_version: header.schema_version.clone(),
        entities: body.entities,
    };
    Ok((header, document))
}

fn check_preamble(preamble: &[u8]) -> Result<usize> {
    if &preamble[..4] != STORE_MAGIC {
        return Err(MigrateError::FormatError("Not a store file (bad magic)".to_string()));
    }
    let format = u16::from_le_bytes([preamble[4], preamble[5]]);
    if format != STORE_FORMAT_VERSION {
        return Err(MigrateError::FormatError(format!(
            "Unsupported store format {} (expected {})",
            format, STORE_FORMAT_VERSION
        )));
    }
    Ok(u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]) as usize)
}

/// Reads the preamble and header only; the body is never touched.
pub fn read_header(path: &Path) -> Result<StoreHeader> {
    let file = File::open(path)
        .map_err(|e| MigrateError::io(format!("Failed to open store '{}'", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let mut preamble = [0u8; PREAMBLE_LEN];
    reader.read_exact(&mut preamble).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => MigrateError::FormatError("Store file is truncated".to_string()),
        _ => MigrateError::io(format!("Failed to read store '{}'", path.display()), e),
    })?;
    let header_len = check_preamble(&preamble)?;

    let mut header = Vec::new();
    reader
        .take(header_len as u64)
        .read_to_end(&mut header)
        .map_err(|e| MigrateError::io(format!("Failed to read store '{}'", path.display()), e))?;
    if header.len() < header_len {
        return Err(MigrateError::FormatError("Store header is truncated".to_string()));
    }

    rmp_serde::from_slice(&header)
        .map_err(|e| MigrateError::FormatError(format!("Failed to deserialize store header: {}", e)))
}

/// Schema version the store at `path` declares about itself.
///
/// Any failure to identify the store, including a missing file, is reported
/// as `UnresolvableSourceVersion`.
pub fn read_declared_version(path: &Path) -> Result<SchemaVersion> {
    read_header(path)
        .map(|header| header.schema_version)
        .map_err(|err| MigrateError::UnresolvableSourceVersion {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

pub fn read_document(path: &Path) -> Result<StoreDocument> {
    let bytes = std::fs::read(path)
        .map_err(|e| MigrateError::io(format!("Failed to read store '{}'", path.display()), e))?;
    decode(&bytes).map(|(_, document)| document)
}

/// Encodes `document` into `writer`, flushing when done.
pub fn write_document<W: Write>(writer: &mut W, document: &StoreDocument) -> Result<()> {
    let bytes = encode(document)?;
    writer
        .write_all(&bytes)
        .map_err(|e| MigrateError::io("Failed to write store", e))?;
    writer.flush().map_err(|e| MigrateError::io("Failed to flush store", e))
}

/// Writes a store at `path` atomically: temp file in the same directory,
/// fsync, then rename over `path`.
pub fn save_document(path: &Path, document: &StoreDocument) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| {
        MigrateError::io(format!("Failed to create store directory '{}'", parent.display()), e)
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".store-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| MigrateError::io("Failed to create temp file", e))?;
    write_document(temp.as_file_mut(), document)?;
    temp.as_file()
        .sync_all()
        .map_err(|e| MigrateError::io("Failed to sync store", e))?;
    // Overwriting keeps the existing file's mode.
    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| MigrateError::io("Failed to apply store permissions", e))?;
    }
    temp.persist(path).map_err(|e| {
        MigrateError::io(format!("Failed to rename store into '{}'", path.display()), e.error)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use tempfile::TempDir;

    fn record(id: i64, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), Value::Integer(id));
        record.insert("name".into(), Value::Text(name.into()));
        record.insert("price".into(), Value::Float(2.5));
        record.insert("active".into(), Value::Boolean(true));
        record.insert("note".into(), Value::Null);
        record
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shop.store");
        let document = StoreDocument::new("Model 1")
            .with_records("Product", vec![record(1, "mug"), record(2, "cap")]);

        save_document(&path, &document).unwrap();

        let loaded = read_document(&path).unwrap();
        assert_eq!(loaded, document);

        let header = read_header(&path).unwrap();
        assert_eq!(header.schema_version, SchemaVersion::new("Model 1"));
        assert_eq!(header.record_count, 2);
        assert_eq!(header.entity_counts.get("Product"), Some(&2));
    }

    #[test]
    fn test_declared_version_from_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shop.store");
        save_document(&path, &StoreDocument::new("Model 7")).unwrap();

        // Garbage after the header must not matter.
        let mut bytes = std::fs::read(&path).unwrap();
        let header_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        bytes.truncate(PREAMBLE_LEN + header_len);
        bytes.extend_from_slice(b"not msgpack");
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(read_declared_version(&path).unwrap(), SchemaVersion::new("Model 7"));
        assert!(read_document(&path).is_err());
    }

    #[test]
    fn test_unidentifiable_stores() {
        let temp_dir = TempDir::new().unwrap();

        let garbage = temp_dir.path().join("garbage.store");
        std::fs::write(&garbage, b"definitely not a store").unwrap();
        assert!(matches!(
            read_declared_version(&garbage),
            Err(MigrateError::UnresolvableSourceVersion { .. })
        ));

        let short = temp_dir.path().join("short.store");
        std::fs::write(&short, b"SMST").unwrap();
        assert!(matches!(
            read_declared_version(&short),
            Err(MigrateError::UnresolvableSourceVersion { .. })
        ));

        let missing = temp_dir.path().join("missing.store");
        assert!(matches!(
            read_declared_version(&missing),
            Err(MigrateError::UnresolvableSourceVersion { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_over_existing_store_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.store");
        save_document(&path, &StoreDocument::new("v1")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        save_document(&path, &StoreDocument::new("v2")).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);
    }

    #[test]
    fn test_oversized_header_length_is_truncation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("huge.store");
        let mut bytes = STORE_MAGIC.to_vec();
        bytes.extend_from_slice(&STORE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(read_header(&path), Err(MigrateError::FormatError(msg)) if msg.contains("truncated")));
    }

    #[test]
    fn test_unsupported_format_version() {
        let mut bytes = encode(&StoreDocument::new("v1")).unwrap();
        bytes[4] = 9;
        assert!(matches!(decode(&bytes), Err(MigrateError::FormatError(msg)) if msg.contains("Unsupported")));
    }
}
