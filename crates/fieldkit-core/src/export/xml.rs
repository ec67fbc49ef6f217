use crate::{
    error::{Error, ErrorOrigin},
    export::{
        ExportError, ExportResult, Exporter, QUALIFIED_NAME_SEPARATOR, ensure_folder, export_path,
        write_file,
    },
    model::{ColumnKind, SchemaId, SchemaRegistry},
    record::{Record, Value, ValueSet},
};
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const TAG_RECORDS_EXPORT: &str = "RecordsExport";
pub const TAG_RECORD: &str = "Record";
pub const ATTRIBUTE_EXPORTED_AT: &str = "exportedAt";
pub const ATTRIBUTE_MODEL_ID: &str = "modelID";
pub const ATTRIBUTE_MODEL_SCHEMA_NUMBER: &str = "modelSchemaNumber";
pub const ATTRIBUTE_SCHEMA_NAME: &str = "schemaName";
pub const LEGACY_ATTRIBUTE_SCHEMA_ID: &str = "schema-id";
pub const LEGACY_ATTRIBUTE_SCHEMA_VERSION: &str = "schema-version";
pub const LEGACY_DEFAULT_SCHEMA_VERSION: i64 = 0;

/// Deepest element nesting the importer accepts.
pub const MAX_ELEMENT_DEPTH: usize = 64;

///
/// CompositeMode
///
/// How nested record values are written.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompositeMode {
    /// One element per leaf, named by its qualified name (`Where.Latitude`).
    #[default]
    Flat,

    /// Nested elements mirroring the nesting of the columns.
    Nested,

    /// One element holding the composite's text form.
    String,
}

///
/// XmlExporter
///

#[derive(Clone, Debug)]
pub struct XmlExporter {
    folder: PathBuf,
    mode: CompositeMode,
    include_virtual_columns: bool,
}

impl XmlExporter {
    pub const FILE_EXTENSION: &'static str = "xml";

    pub fn new(folder: impl AsRef<Path>) -> Result<Self, ExportError> {
        let folder = folder.as_ref();
        ensure_folder(folder)?;

        Ok(Self {
            folder: folder.to_path_buf(),
            mode: CompositeMode::default(),
            include_virtual_columns: true,
        })
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: CompositeMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_virtual_columns(mut self, include: bool) -> Self {
        self.include_virtual_columns = include;
        self
    }

    /// XML document for `records` and the number of records it holds.
    /// Records of schemas outside a model are skipped.
    pub fn render(&self, records: &[Record]) -> Result<(String, usize), Error> {
        let exported_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| Error::invalid_state(ErrorOrigin::Export, err.to_string()))?;

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<{TAG_RECORDS_EXPORT} {ATTRIBUTE_EXPORTED_AT}=\"{}\">",
            escape(&exported_at)
        );

        let mut count = 0;
        for record in records {
            let schema = record.schema();
            let Some(id) = schema.id() else {
                tracing::warn!(schema = schema.name(), "skipping record of a schema outside a model");
                continue;
            };

            let _ = writeln!(
                out,
                "\t<{TAG_RECORD} {ATTRIBUTE_MODEL_ID}=\"{}\" {ATTRIBUTE_MODEL_SCHEMA_NUMBER}=\"{}\" {ATTRIBUTE_SCHEMA_NAME}=\"{}\">",
                id.model_id(),
                id.number(),
                escape(schema.name())
            );
            self.write_values(&mut out, record.value_set(), 2, "");
            let _ = writeln!(out, "\t</{TAG_RECORD}>");
            count += 1;
        }

        let _ = writeln!(out, "</{TAG_RECORDS_EXPORT}>");

        Ok((out, count))
    }

    fn write_values(&self, out: &mut String, values: &ValueSet, depth: usize, prefix: &str) {
        let indent = "\t".repeat(depth);

        for (position, column) in values.columns().iter().enumerate() {
            let Some(value) = values.get_at(position) else {
                continue;
            };
            let name = format!("{prefix}{}", column.name());

            match (column.kind(), value, self.mode) {
                (ColumnKind::Record(_), Value::Record(nested), CompositeMode::Flat) => {
                    let prefix = format!("{name}{QUALIFIED_NAME_SEPARATOR}");
                    self.write_values(out, nested, depth, &prefix);
                }
                (ColumnKind::Record(_), Value::Record(nested), CompositeMode::Nested) => {
                    let _ = writeln!(out, "{indent}<{name}>");
                    self.write_values(out, nested, depth + 1, "");
                    let _ = writeln!(out, "{indent}</{name}>");
                }
                _ => {
                    let text = escape(&column.format(value));
                    let _ = writeln!(out, "{indent}<{name}>{text}</{name}>");
                }
            }

            if self.include_virtual_columns {
                for virtual_column in column.virtual_columns() {
                    if let Some(text) = virtual_column.derive(column, value) {
                        let _ = writeln!(
                            out,
                            "{indent}<{prefix}{0}>{1}</{prefix}{0}>",
                            virtual_column.name(),
                            escape(&text)
                        );
                    }
                }
            }
        }
    }
}

impl Exporter for XmlExporter {
    fn export(&self, records: &[Record], description: &str) -> Result<ExportResult, Error> {
        let path = export_path(&self.folder, description, Self::FILE_EXTENSION)?;
        let (contents, count) = self.render(records)?;
        write_file(&path, &contents)?;
        tracing::debug!(path = %path.display(), count, mode = ?self.mode, "exported records to XML");

        Ok(ExportResult { count, path })
    }
}

// ============================================================================
// Import
// ============================================================================

///
/// ImportResult
///

#[derive(Clone, Debug, Default)]
pub struct ImportResult {
    pub records: Vec<Record>,

    /// Skipped records, unknown columns and unparsable values.
    pub warnings: Vec<String>,
}

impl ImportResult {
    fn warn(&mut self, message: String) {
        tracing::warn!(%message, "XML import");
        self.warnings.push(message);
    }
}

///
/// XmlImporter
///
/// Reads documents written by [`XmlExporter`] in any composite mode.
/// Records of unknown schemas are skipped with a warning; virtual column
/// elements are ignored.
///

#[derive(Clone, Debug)]
pub struct XmlImporter {
    registry: Arc<SchemaRegistry>,
}

impl XmlImporter {
    #[must_use]
    pub const fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn import_file(&self, path: impl AsRef<Path>) -> Result<ImportResult, Error> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ExportError::File {
            operation: "read",
            path: path.to_path_buf(),
            source,
        })?;

        self.import_str(&input)
    }

    pub fn import_str(&self, input: &str) -> Result<ImportResult, Error> {
        let root = Parser::new(input).document()?;
        if root.name != TAG_RECORDS_EXPORT {
            return Err(ExportError::Malformed {
                line: root.line,
                message: format!("expected <{TAG_RECORDS_EXPORT}>, found <{}>", root.name),
            }
            .into());
        }

        let mut result = ImportResult::default();
        for element in &root.children {
            if element.name != TAG_RECORD {
                result.warn(format!("ignored unrecognised element <{}>", element.name));
                continue;
            }
            if let Some(nested) = element.children.iter().find(|c| c.name == TAG_RECORD) {
                return Err(ExportError::Malformed {
                    line: nested.line,
                    message: "records cannot be nested".to_string(),
                }
                .into());
            }

            if let Some(record) = self.import_record(element, &mut result)? {
                result.records.push(record);
            }
        }
        tracing::debug!(
            records = result.records.len(),
            warnings = result.warnings.len(),
            "imported XML records"
        );

        Ok(result)
    }

    fn import_record(&self, element: &Element, result: &mut ImportResult) -> Result<Option<Record>, Error> {
        let resolved = if element.attribute(LEGACY_ATTRIBUTE_SCHEMA_ID).is_some() {
            let schema_id = required_number::<i64>(element, LEGACY_ATTRIBUTE_SCHEMA_ID)?;
            let version = match element.attribute(LEGACY_ATTRIBUTE_SCHEMA_VERSION) {
                Some(_) => required_number::<i64>(element, LEGACY_ATTRIBUTE_SCHEMA_VERSION)?,
                None => LEGACY_DEFAULT_SCHEMA_VERSION,
            };
            self.registry
                .legacy_schema(schema_id, version)
                .map_err(|_| format!("legacy schema with ID {schema_id} and version {version}"))
        } else {
            let model_id = required_number::<u64>(element, ATTRIBUTE_MODEL_ID)?;
            let number = required_number::<u8>(element, ATTRIBUTE_MODEL_SCHEMA_NUMBER)?;
            let id = SchemaId::new(model_id, number);
            self.registry
                .schema(id)
                .map_err(|_| format!("schema {id}"))
        };

        let schema = match resolved {
            Ok(schema) => schema.clone(),
            Err(described) => {
                result.warn(format!("record skipped because {described} is unknown"));
                return Ok(None);
            }
        };

        let mut entries = Vec::new();
        for child in &element.children {
            child.flatten(&[], &mut entries);
        }

        let mut record = Record::new(schema)?;
        fill(&mut record, &entries, result);

        Ok(Some(record))
    }
}

/// Leaf text keyed by its path of column names below the current set.
type Entry = (Vec<String>, String);

fn fill(values: &mut ValueSet, entries: &[Entry], result: &mut ImportResult) {
    let columns = values.columns().clone();

    // group by first name, keeping document order
    let mut groups: Vec<(&str, Vec<Entry>)> = Vec::new();
    for (path, text) in entries {
        let Some((first, rest)) = path.split_first() else {
            continue;
        };
        let entry = (rest.to_vec(), text.clone());
        match groups.iter_mut().find(|(name, _)| *name == first.as_str()) {
            Some((_, group)) => group.push(entry),
            None => groups.push((first.as_str(), vec![entry])),
        }
    }

    for (name, group) in groups {
        let Some(position) = columns.position(name) else {
            if columns.virtual_column(name).is_none() {
                result.warn(format!("column {name} does not exist in {}", columns.name()));
            }
            continue;
        };
        let Some(column) = columns.column_at(position) else {
            continue;
        };

        let value = match column.kind() {
            ColumnKind::Record(nested) if group.iter().any(|(rest, _)| !rest.is_empty()) => {
                let mut set = nested.new_value();
                let inner = group
                    .into_iter()
                    .filter(|(rest, _)| !rest.is_empty())
                    .collect::<Vec<_>>();
                fill(&mut set, &inner, result);
                Value::Record(set)
            }
            _ => {
                let Some((_, text)) = group.iter().rev().find(|(rest, _)| rest.is_empty()) else {
                    continue;
                };
                let text = text.trim();
                // empty elements stand for missing values
                if text.is_empty() {
                    continue;
                }
                match column.parse(text) {
                    Ok(value) => value,
                    Err(err) => {
                        result.warn(format!("cannot parse '{text}' for column {name}: {err}"));
                        continue;
                    }
                }
            }
        };

        if let Err(err) = values.set_at(position, value) {
            result.warn(format!("cannot set column {name}: {err}"));
        }
    }
}

fn required_number<T: std::str::FromStr>(element: &Element, attribute: &str) -> Result<T, ExportError> {
    let text = element.attribute(attribute).ok_or_else(|| ExportError::Malformed {
        line: element.line,
        message: format!("<{}> lacks the {attribute} attribute", element.name),
    })?;

    text.trim().parse().map_err(|_| ExportError::Malformed {
        line: element.line,
        message: format!("attribute {attribute}=\"{text}\" is not a valid number"),
    })
}

// ============================================================================
// Document model
// ============================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
    line: usize,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn flatten(&self, parent: &[String], out: &mut Vec<Entry>) {
        let mut path = parent.to_vec();
        path.extend(self.name.split(QUALIFIED_NAME_SEPARATOR).map(str::to_string));

        if self.children.is_empty() {
            out.push((path, self.text.clone()));
        } else {
            for child in &self.children {
                child.flatten(&path, out);
            }
        }
    }
}

///
/// Parser
///
/// Recursive-descent reader for the XML subset the exporter writes:
/// elements, attributes, character data, CDATA sections, comments,
/// processing instructions and a DOCTYPE line. Namespaces and entity
/// declarations are not supported. Nesting is capped at
/// [`MAX_ELEMENT_DEPTH`].
///

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            depth: 0,
        }
    }

    fn document(&mut self) -> Result<Element, ExportError> {
        self.skip_misc()?;
        let root = self.element()?;
        self.skip_misc()?;
        if !self.is_eof() {
            return Err(self.error("content after the root element"));
        }

        Ok(root)
    }

    fn element(&mut self) -> Result<Element, ExportError> {
        if self.depth == MAX_ELEMENT_DEPTH {
            return Err(self.error(&format!(
                "elements are nested deeper than {MAX_ELEMENT_DEPTH} levels"
            )));
        }

        self.depth += 1;
        let element = self.element_contents();
        self.depth -= 1;

        element
    }

    fn element_contents(&mut self) -> Result<Element, ExportError> {
        let line = self.line;
        self.expect("<")?;
        let name = self.name()?;
        let mut element = Element {
            name,
            line,
            ..Element::default()
        };

        loop {
            self.skip_whitespace();
            if self.eat("/>") {
                return Ok(element);
            }
            if self.eat(">") {
                break;
            }
            let key = self.name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.quoted()?;
            element.attributes.push((key, value));
        }

        loop {
            if self.eat("</") {
                let closing = self.name()?;
                if closing != element.name {
                    return Err(self.error(&format!(
                        "</{closing}> does not close <{}>",
                        element.name
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(element);
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.eat("<![CDATA[") {
                let text = self.take_until("]]>")?;
                element.text.push_str(text);
            } else if self.starts_with("<") {
                element.children.push(self.element()?);
            } else if self.is_eof() {
                return Err(self.error(&format!("<{}> is never closed", element.name)));
            } else {
                let raw = self.take_while(|c| c != '<');
                element.text.push_str(&self.unescape(raw)?);
            }
        }
    }

    fn skip_misc(&mut self) -> Result<(), ExportError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<String, ExportError> {
        let name = self.take_while(|c| !c.is_whitespace() && !matches!(c, '/' | '>' | '=' | '<'));
        if name.is_empty() {
            return Err(self.error("expected a name"));
        }

        Ok(name.to_string())
    }

    fn quoted(&mut self) -> Result<String, ExportError> {
        let quote = match self.peek() {
            Some(c @ ('"' | '\'')) => c,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.advance(quote.len_utf8());
        let raw = self.take_while(|c| c != quote);
        if !self.eat(&quote.to_string()) {
            return Err(self.error("unterminated attribute value"));
        }

        self.unescape(raw)
    }

    fn unescape(&self, raw: &str) -> Result<String, ExportError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(start) = rest.find('&') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after
                .find(';')
                .ok_or_else(|| self.error("unterminated entity reference"))?;
            let entity = &after[..end];
            let c = match entity {
                "lt" => '<',
                "gt" => '>',
                "amp" => '&',
                "quot" => '"',
                "apos" => '\'',
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(&format!("unknown entity &{entity};")))?,
            };
            out.push(c);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.advance(prefix.len());
            true
        } else {
            false
        }
    }

    fn expect(&mut self, prefix: &str) -> Result<(), ExportError> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{prefix}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest.find(|c| !keep(c)).unwrap_or(rest.len());
        self.advance(len);

        &self.input[start..start + len]
    }

    fn take_until(&mut self, terminator: &str) -> Result<&'a str, ExportError> {
        let start = self.pos;
        let len = self.input[start..]
            .find(terminator)
            .ok_or_else(|| self.error(&format!("missing '{terminator}'")))?;
        self.advance(len + terminator.len());

        Ok(&self.input[start..start + len])
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), ExportError> {
        self.take_until(terminator).map(|_| ())
    }

    /// Move past `len` bytes, counting the newlines crossed.
    fn advance(&mut self, len: usize) {
        let end = self.pos + len;
        self.line += self.input.as_bytes()[self.pos..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.pos = end;
    }

    fn error(&self, message: &str) -> ExportError {
        ExportError::Malformed {
            line: self.line,
            message: message.to_string(),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }

    out
}
