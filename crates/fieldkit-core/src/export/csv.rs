use crate::{
    error::Error,
    export::{
        ColumnPointer, ExportError, ExportResult, Exporter, SchemaTraverser, ensure_folder,
        export_path, write_file,
    },
    model::ColumnKind,
    record::Record,
};
use std::path::{Path, PathBuf};

///
/// CsvExporter
///
/// One header line of qualified column names, then one line per record.
/// Locations and foreign keys are written as a single text-form field and
/// virtual columns are included.
///

#[derive(Clone, Debug)]
pub struct CsvExporter {
    folder: PathBuf,
    separator: char,
}

impl CsvExporter {
    pub const DEFAULT_SEPARATOR: char = ',';
    pub const FILE_EXTENSION: &'static str = "csv";

    const TRAVERSER: SchemaTraverser = SchemaTraverser::new()
        .with_virtual_columns(true)
        .with_location_self_traversal(true)
        .with_foreign_key_self_traversal(true);

    /// Exporter writing into `folder`, which is created when missing.
    pub fn new(folder: impl AsRef<Path>) -> Result<Self, ExportError> {
        let folder = folder.as_ref();
        ensure_folder(folder)?;

        Ok(Self {
            folder: folder.to_path_buf(),
            separator: Self::DEFAULT_SEPARATOR,
        })
    }

    #[must_use]
    pub const fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// CSV text for `records` and the number of records it holds.
    ///
    /// The first record's schema decides the columns; records of any other
    /// schema are skipped.
    #[must_use]
    pub fn render(&self, records: &[Record]) -> (String, usize) {
        let Some(first) = records.first() else {
            return (String::new(), 0);
        };
        let schema = first.schema();
        let pointers = Self::TRAVERSER.leaves(schema.columns());

        let header = pointers
            .iter()
            .map(ColumnPointer::qualified_name)
            .collect::<Vec<_>>()
            .join(&self.separator.to_string());
        let mut out = header;
        out.push('\n');

        let mut count = 0;
        for record in records {
            if record.schema().id() != schema.id() {
                tracing::warn!(
                    schema = record.schema().name(),
                    expected = schema.name(),
                    "skipping record of another schema in CSV export"
                );
                continue;
            }

            let row = pointers
                .iter()
                .map(|pointer| self.field(pointer, record))
                .collect::<Vec<_>>()
                .join(&self.separator.to_string());
            out.push_str(&row);
            out.push('\n');
            count += 1;
        }

        (out, count)
    }

    fn field(&self, pointer: &ColumnPointer, record: &Record) -> String {
        let Some(text) = pointer.text(record.value_set()) else {
            return String::new();
        };

        // labels go out verbatim, real strings are always quoted
        if pointer.is_virtual() {
            text
        } else if matches!(pointer.column().kind(), ColumnKind::String(_)) || self.needs_quotes(&text) {
            quote(&text)
        } else {
            text
        }
    }

    fn needs_quotes(&self, text: &str) -> bool {
        text.contains([self.separator, '"', '\n', '\r'])
    }
}

impl Exporter for CsvExporter {
    fn export(&self, records: &[Record], description: &str) -> Result<ExportResult, Error> {
        let path = export_path(&self.folder, description, Self::FILE_EXTENSION)?;
        let (contents, count) = self.render(records);
        write_file(&path, &contents)?;
        tracing::debug!(path = %path.display(), count, "exported records to CSV");

        Ok(ExportResult { count, path })
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}
