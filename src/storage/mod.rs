pub mod format;
pub mod workspace;

pub use format::{
    EntityRecords, STORE_FORMAT_VERSION, STORE_MAGIC, StoreDocument, StoreHeader, read_declared_version,
    read_document, read_header, save_document, write_document,
};
pub use workspace::MigrationWorkspace;
