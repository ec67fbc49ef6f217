//! Record export and import.
//!
//! Exporters walk a schema with the [`SchemaTraverser`] and write one row
//! (CSV) or element (XML) per record. The XML importer reads both the
//! current attribute set and the legacy `schema-id`/`schema-version` one.

pub mod csv;
pub mod traverse;
pub mod xml;

#[cfg(test)]
mod tests;

pub use csv::CsvExporter;
pub use traverse::{ColumnPointer, ColumnVisitor, QUALIFIED_NAME_SEPARATOR, SchemaTraverser};
pub use xml::{CompositeMode, ImportResult, XmlExporter, XmlImporter};

use crate::{
    db::store::file_timestamp,
    error::{Error, ErrorClass, ErrorOrigin},
    record::Record,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;
use time::OffsetDateTime;

/// Prefix of every export file name.
pub const EXPORT_FILE_PREFIX: &str = "RecordDump";

///
/// ExportError
///

#[derive(Debug, ThisError)]
pub enum ExportError {
    #[error("{operation} failed on '{}': {source}", path.display())]
    File {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl From<ExportError> for Error {
    fn from(err: ExportError) -> Self {
        let class = match &err {
            ExportError::File { .. } => ErrorClass::StorageBackend,
            ExportError::Malformed { .. } => ErrorClass::UnsupportedFormat,
        };

        Self::new(class, ErrorOrigin::Export, err.to_string())
    }
}

///
/// ExportResult
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportResult {
    /// Number of records written.
    pub count: usize,
    pub path: PathBuf,
}

///
/// Exporter
///

pub trait Exporter {
    /// Write `records` to a new file whose name carries `description`.
    fn export(&self, records: &[Record], description: &str) -> Result<ExportResult, Error>;
}

/// `<folder>/RecordDump_<description>_<timestamp>.<extension>`
pub(crate) fn export_path(folder: &Path, description: &str, extension: &str) -> Result<PathBuf, Error> {
    let stamp = file_timestamp(OffsetDateTime::now_utc())?;

    Ok(folder.join(format!("{EXPORT_FILE_PREFIX}_{description}_{stamp}.{extension}")))
}

pub(crate) fn ensure_folder(folder: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(folder).map_err(|source| ExportError::File {
        operation: "create folder",
        path: folder.to_path_buf(),
        source,
    })
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    fs::write(path, contents).map_err(|source| ExportError::File {
        operation: "write",
        path: path.to_path_buf(),
        source,
    })
}
