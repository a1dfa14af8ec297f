//! Export-log import pipeline
//!
//! Consumes the JSON log an external conversion tool writes next to the
//! files it exports: an array of `{ "NameFile": ..., "StatusExport": ... }`
//! entries, with one sidecar `<NameFile>.json` per entry mapping tag names
//! to either a raw value or a `{ value, units, format, type, description }`
//! dict. Only `"Export ok"` rows are imported; a missing or unreadable
//! sidecar for an ok row aborts the whole batch before anything commits,
//! and before any scan file is copied into the project.
//!
//! The import runs in three milestones: fields registered (one batch,
//! first occurrence of a tag wins), documents added to both scan
//! collections, values flushed. A caller may stream the milestones over an
//! `mpsc` channel and may cancel through a `watch` flag; cancellation is
//! only honored between milestones and never rolls back a committed one.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::fs;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::checksum;
use crate::error::{Error, Result};
use crate::history::HistoryEntry;
use crate::project::{
    Project, COLLECTION_CURRENT, COLLECTION_INITIAL, RAW_DATA_DIR, TAG_CHECKSUM, TAG_FILENAME,
    TAG_TYPE, TYPE_SCAN,
};
use crate::schema::{FieldDef, FieldSpec, FieldType, Unit};
use crate::storage::codec;
use crate::storage::document::{Document, Value};

/// Only rows with this status are imported
pub const STATUS_EXPORT_OK: &str = "Export ok";

/// Bookkeeping tags the conversion tool emits that never become fields
const DROPPED_TAGS: [&str; 3] = ["Dataset data file", "Dataset header file", "Json_Version"];

// ==========================================================================
// Options, progress, report
// ==========================================================================

/// Coarse progress marks, sent in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMilestone {
    FieldsRegistered,
    DocumentsAdded,
    ValuesFlushed,
}

/// Progress and cancellation hooks for a running import
#[derive(Debug, Default)]
pub struct ImportOptions {
    pub progress: Option<mpsc::UnboundedSender<ImportMilestone>>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ImportOptions {
    fn notify(&self, milestone: ImportMilestone) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(milestone);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}

/// What an import did. A cancelled import still reports the milestones
/// that committed before the flag was seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Primary keys added to both collections
    pub added_keys: Vec<String>,
    /// `NameFile` values skipped for a non-ok export status
    pub skipped: Vec<String>,
    /// Tags registered by this import, in first-occurrence order
    pub fields_registered: Vec<String>,
    pub cancelled: bool,
}

// ==========================================================================
// Log and sidecar shapes
// ==========================================================================

#[derive(Debug, serde::Deserialize)]
struct ExportLogEntry {
    #[serde(rename = "NameFile")]
    name_file: String,
    #[serde(rename = "StatusExport")]
    status_export: String,
}

/// One sidecar tag, with the dict form's metadata flattened out
struct TagPayload {
    value: serde_json::Value,
    format: Option<String>,
    unit: Option<Unit>,
    description: Option<String>,
}

fn parse_tag_payload(raw: &serde_json::Value) -> TagPayload {
    if let serde_json::Value::Object(map) = raw {
        if map.contains_key("value") {
            return TagPayload {
                value: map.get("value").cloned().unwrap_or(serde_json::Value::Null),
                format: map
                    .get("format")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                unit: map
                    .get("units")
                    .and_then(|v| v.as_str())
                    .and_then(Unit::from_name),
                description: map
                    .get("description")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            };
        }
    }
    TagPayload {
        value: raw.clone(),
        format: None,
        unit: None,
        description: None,
    }
}

/// One ok row fully parsed and type-checked, before its scan file has moved
struct ParsedScan {
    name: String,
    key: String,
    values: Vec<(String, Value)>,
}

/// One scan with its file inside the project, ready to commit
struct StagedScan {
    key: String,
    checksum: String,
    values: Vec<(String, Value)>,
}

// ==========================================================================
// Format-token type inference
// ==========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemporalKind {
    Date,
    Time,
    DateTime,
}

impl TemporalKind {
    fn field_type(self) -> FieldType {
        match self {
            TemporalKind::Date => FieldType::Date,
            TemporalKind::Time => FieldType::Time,
            TemporalKind::DateTime => FieldType::DateTime,
        }
    }
}

/// Classify a declared format string against the fixed token table:
/// `y`/`Y` year, `M` month, `d` day, `H` hour, `m` minute, `s` second,
/// `S`/`f` fraction. Every letter must belong to the table; any other
/// letter or digit leaves the tag string-typed.
fn infer_temporal(format: &str) -> Option<TemporalKind> {
    let mut has_date = false;
    let mut has_time = false;
    for c in format.chars() {
        match c {
            'y' | 'Y' | 'M' | 'd' => has_date = true,
            'H' | 'm' | 's' | 'S' | 'f' => has_time = true,
            c if c.is_ascii_alphanumeric() => return None,
            _ => {}
        }
    }
    match (has_date, has_time) {
        (true, true) => Some(TemporalKind::DateTime),
        (true, false) => Some(TemporalKind::Date),
        (false, true) => Some(TemporalKind::Time),
        (false, false) => None,
    }
}

/// Translate a declared format into a chrono format string, run by run.
/// A fraction run swallows a preceding literal dot so `.SSS` becomes the
/// dot-prefixed `%.f` directive.
fn chrono_format(declared: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = declared.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        match c {
            'y' | 'Y' => out.push_str(if run >= 4 { "%Y" } else { "%y" }),
            'M' => out.push_str("%m"),
            'd' => out.push_str("%d"),
            'H' => out.push_str("%H"),
            'm' => out.push_str("%M"),
            's' => out.push_str("%S"),
            'S' | 'f' => {
                if out.ends_with('.') {
                    out.pop();
                    out.push_str("%.f");
                } else {
                    out.push_str(match run {
                        3 => "%3f",
                        6 => "%6f",
                        9 => "%9f",
                        _ => "%.f",
                    });
                }
            }
            _ => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }
        i += run;
    }
    out
}

fn parse_temporal(text: &str, kind: TemporalKind, declared: &str) -> Option<Value> {
    let fmt = chrono_format(declared);
    match kind {
        TemporalKind::Date => NaiveDate::parse_from_str(text, &fmt).ok().map(Value::Date),
        TemporalKind::Time => NaiveTime::parse_from_str(text, &fmt).ok().map(Value::Time),
        TemporalKind::DateTime => NaiveDateTime::parse_from_str(text, &fmt)
            .ok()
            .map(Value::DateTime),
    }
}

// ==========================================================================
// Value staging
// ==========================================================================

/// Convert one raw scalar, using the declared format when the value is
/// text. A declared format that fails to classify or parse leaves the
/// value string-typed.
fn convert_scalar(json: &serde_json::Value, format: Option<&str>) -> (FieldType, Value) {
    if let Some(text) = json.as_str() {
        if let Some(declared) = format {
            if let Some(kind) = infer_temporal(declared) {
                if let Some(value) = parse_temporal(text, kind, declared) {
                    return (kind.field_type(), value);
                }
            }
        }
        return (FieldType::String, Value::String(text.to_string()));
    }
    match json {
        serde_json::Value::Bool(b) => (FieldType::Bool, Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                (FieldType::Int, Value::Int(i))
            } else {
                (FieldType::Float, Value::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::Null => (FieldType::String, Value::Null),
        other => (FieldType::String, Value::String(other.to_string())),
    }
}

fn stringified(json: &serde_json::Value) -> Value {
    match json.as_str() {
        Some(s) => Value::String(s.to_string()),
        None => Value::String(json.to_string()),
    }
}

/// Convert a multi-element list. The element type comes from the first
/// element; an int/float mix promotes to float, anything else falls back
/// to a list of strings.
fn convert_list(items: &[serde_json::Value], format: Option<&str>) -> (FieldType, Value) {
    if items.is_empty() {
        return (
            FieldType::List(Box::new(FieldType::String)),
            Value::List(vec![]),
        );
    }
    let mut element_type = convert_scalar(&items[0], format).0;
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let (item_type, value) = convert_scalar(item, format);
        match (&element_type, &item_type) {
            (a, b) if a == b => {}
            (FieldType::Int, FieldType::Float) => element_type = FieldType::Float,
            (FieldType::Float, FieldType::Int) => {}
            _ => {
                return (
                    FieldType::List(Box::new(FieldType::String)),
                    Value::List(items.iter().map(stringified).collect()),
                );
            }
        }
        values.push(value);
    }
    if element_type == FieldType::Float {
        for value in &mut values {
            if let Value::Int(i) = value {
                *value = Value::Float(*i as f64);
            }
        }
    }
    (FieldType::List(Box::new(element_type)), Value::List(values))
}

/// Stage one tag value: single-element lists collapse to a scalar, longer
/// lists keep the list-variant of the inferred element type
fn stage_value(payload: &TagPayload) -> (FieldType, Value) {
    let format = payload.format.as_deref();
    match &payload.value {
        serde_json::Value::Array(items) if items.len() == 1 => convert_scalar(&items[0], format),
        serde_json::Value::Array(items) => convert_list(items, format),
        other => convert_scalar(other, format),
    }
}

/// Fit a staged value into an already-declared field type. String targets
/// absorb anything via the codec's textual rendering; everything else must
/// type-check after list promotion.
fn coerce_into(value: Value, target: &FieldType) -> Option<Value> {
    let value = codec::promote_to_list(value, target);
    if codec::check_value_type(&value, target) {
        return Some(value);
    }
    match target {
        FieldType::String => Some(Value::String(codec::format_value(&value))),
        FieldType::List(element) if **element == FieldType::String => match value {
            Value::List(items) => Some(Value::List(
                items
                    .iter()
                    .map(|item| Value::String(codec::format_value(item)))
                    .collect(),
            )),
            other => Some(Value::List(vec![Value::String(codec::format_value(
                &other,
            ))])),
        },
        _ => None,
    }
}

// ==========================================================================
// Pipeline
// ==========================================================================

impl Project {
    /// Import every successfully exported scan listed in an export log.
    ///
    /// The batch stages completely before anything commits, then runs the
    /// three milestones in order. Sidecar tags named after the primary key
    /// are dropped like the exporter's bookkeeping tags; the key cell comes
    /// from the placed file. Exactly one `add_scans` history entry is
    /// pushed once documents exist; registered fields are not part of the
    /// entry (undoing an import removes the scans, not the tags).
    pub async fn import_export_log(
        &mut self,
        log_path: &Path,
        options: ImportOptions,
    ) -> Result<ImportReport> {
        let entries = read_export_log(log_path).await?;
        let source_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
        debug!(log = %log_path.display(), entries = entries.len(), "staging import");

        let mut report = ImportReport::default();
        let mut parsed: Vec<ParsedScan> = Vec::new();
        let mut new_fields: Vec<(String, FieldDef)> = Vec::new();
        let mut known: HashMap<String, FieldType> = self
            .database
            .get_fields(COLLECTION_CURRENT)?
            .map(|(name, def)| (name.clone(), def.field_type.clone()))
            .collect();
        let mut batch_keys = HashSet::new();

        for entry in &entries {
            if entry.status_export != STATUS_EXPORT_OK {
                report.skipped.push(entry.name_file.clone());
                continue;
            }

            let key = format!("{}/{}.nii", RAW_DATA_DIR, entry.name_file);
            if !batch_keys.insert(key.clone())
                || self.database.has_document(COLLECTION_CURRENT, &key)?
            {
                return Err(Error::DocumentAlreadyExists {
                    collection: COLLECTION_CURRENT.to_string(),
                    key,
                });
            }

            let sidecar = source_dir.join(format!("{}.json", entry.name_file));
            let tags = read_sidecar(&sidecar).await?;

            let mut values = Vec::new();
            for (tag, raw) in &tags {
                // the primary key cell derives from the placed file
                if DROPPED_TAGS.contains(&tag.as_str()) || tag == TAG_FILENAME {
                    continue;
                }
                let payload = parse_tag_payload(raw);
                let (field_type, value) = stage_value(&payload);
                let rendering = codec::format_value(&value);
                let value = match known.get(tag.as_str()) {
                    Some(existing) => {
                        coerce_into(value, existing).ok_or_else(|| Error::TypeMismatch {
                            field: tag.clone(),
                            expected: existing.to_string(),
                            value: rendering,
                        })?
                    }
                    None => {
                        known.insert(tag.clone(), field_type.clone());
                        new_fields.push((
                            tag.clone(),
                            FieldDef {
                                field_type,
                                description: payload.description,
                                unit: payload.unit,
                                ..Default::default()
                            },
                        ));
                        value
                    }
                };
                if !value.is_null() {
                    values.push((tag.clone(), value));
                }
            }

            parsed.push(ParsedScan {
                name: entry.name_file.clone(),
                key,
                values,
            });
        }

        // Every sidecar parsed; check every scan file is reachable before
        // the first copy, then let the files land and hash them
        for scan in &parsed {
            self.expect_scan_file(source_dir, &scan.name).await?;
        }
        let mut staged = Vec::with_capacity(parsed.len());
        for scan in parsed {
            let file = self.place_scan_file(source_dir, &scan.name).await?;
            let digest = checksum::checksum_file(&file).await?;
            staged.push(StagedScan {
                key: scan.key,
                checksum: digest,
                values: scan.values,
            });
        }

        // Milestone 1: fields, one all-or-nothing batch
        let mut specs = Vec::with_capacity(new_fields.len() * 2);
        for (name, def) in &new_fields {
            for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
                specs.push(FieldSpec {
                    collection: collection.to_string(),
                    name: name.clone(),
                    def: def.clone(),
                });
            }
        }
        self.database.add_fields(&specs)?;
        report.fields_registered = new_fields.iter().map(|(name, _)| name.clone()).collect();
        options.notify(ImportMilestone::FieldsRegistered);

        if options.is_cancelled() {
            info!("import cancelled after field registration");
            report.cancelled = true;
            return Ok(report);
        }

        // Milestone 2: documents in both collections
        let keys: Vec<String> = staged.iter().map(|scan| scan.key.clone()).collect();
        for scan in &staged {
            let mut doc = Document::new(scan.key.clone());
            doc.set(TAG_TYPE, TYPE_SCAN);
            doc.set(TAG_CHECKSUM, scan.checksum.clone());
            self.database.add_document(COLLECTION_CURRENT, doc.clone())?;
            self.database.add_document(COLLECTION_INITIAL, doc)?;
        }
        options.notify(ImportMilestone::DocumentsAdded);

        if options.is_cancelled() {
            // Documents committed; log them so the cancelled batch can
            // still be taken back as a unit.
            self.record_added_scans(&keys)?;
            info!(added = keys.len(), "import cancelled after documents");
            report.added_keys = keys;
            report.cancelled = true;
            return Ok(report);
        }

        // Milestone 3: values, then declared defaults for untouched cells
        for scan in &staged {
            for (tag, value) in &scan.values {
                self.database
                    .set_value(COLLECTION_CURRENT, &scan.key, tag, value.clone())?;
                self.database
                    .set_value(COLLECTION_INITIAL, &scan.key, tag, value.clone())?;
            }
        }
        self.apply_import_defaults(&keys)?;
        options.notify(ImportMilestone::ValuesFlushed);

        self.record_added_scans(&keys)?;
        info!(
            added = keys.len(),
            skipped = report.skipped.len(),
            fields = report.fields_registered.len(),
            "import finished"
        );
        report.added_keys = keys;
        Ok(report)
    }

    /// Check `<name>.nii` exists in the export directory or already inside
    /// `data/raw_data/`, without copying anything
    async fn expect_scan_file(&self, source_dir: &Path, name: &str) -> Result<()> {
        let file_name = format!("{}.nii", name);
        let source = source_dir.join(&file_name);
        if fs::try_exists(&source).await.unwrap_or(false) {
            return Ok(());
        }
        if fs::try_exists(&self.raw_data_dir().join(&file_name))
            .await
            .unwrap_or(false)
        {
            return Ok(());
        }
        Err(Error::ImportFailed {
            path: source,
            reason: "scan file not found".to_string(),
        })
    }

    /// Copy `<name>.nii` from the export directory into `data/raw_data/`
    /// unless it already lives there. The file must exist somewhere; the
    /// checksum is taken from the copy inside the project.
    async fn place_scan_file(&self, source_dir: &Path, name: &str) -> Result<PathBuf> {
        let file_name = format!("{}.nii", name);
        let dest = self.raw_data_dir().join(&file_name);
        let source = source_dir.join(&file_name);
        if source != dest && fs::try_exists(&source).await.unwrap_or(false) {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| Error::FileWriteError {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            fs::copy(&source, &dest)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: dest.clone(),
                    source,
                })?;
        }
        if !fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(Error::ImportFailed {
                path: source,
                reason: "scan file not found".to_string(),
            });
        }
        Ok(dest)
    }

    /// Defaults declared on current-collection fields fill any cell the
    /// import left unset on the new scans, identically on both sides
    fn apply_import_defaults(&mut self, keys: &[String]) -> Result<()> {
        let def = self.database.collection_def(COLLECTION_CURRENT)?.clone();
        for (field, field_def) in &def.fields {
            let Some(default) = &field_def.default else {
                continue;
            };
            if *field == def.primary_key {
                continue;
            }
            let value = codec::from_storage(default, &field_def.field_type)
                .map_err(|e| e.for_field(field))?;
            if value.is_null() {
                continue;
            }
            for key in keys {
                if self
                    .database
                    .get_value(COLLECTION_CURRENT, key, field)?
                    .is_null()
                {
                    self.database
                        .set_value(COLLECTION_CURRENT, key, field, value.clone())?;
                    self.database
                        .set_value(COLLECTION_INITIAL, key, field, value.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Snapshot the named documents from both collections and push the
    /// batch's single `add_scans` entry
    fn record_added_scans(&mut self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut current = Vec::with_capacity(keys.len());
        let mut initial = Vec::with_capacity(keys.len());
        for key in keys {
            current.push(
                self.database
                    .get_document(COLLECTION_CURRENT, key)?
                    .cloned()
                    .ok_or_else(|| Error::DocumentNotFound {
                        collection: COLLECTION_CURRENT.to_string(),
                        key: key.clone(),
                    })?,
            );
            initial.push(
                self.database
                    .get_document(COLLECTION_INITIAL, key)?
                    .cloned()
                    .ok_or_else(|| Error::DocumentNotFound {
                        collection: COLLECTION_INITIAL.to_string(),
                        key: key.clone(),
                    })?,
            );
        }
        self.history
            .record(HistoryEntry::AddScans { current, initial });
        Ok(())
    }
}

async fn read_export_log(path: &Path) -> Result<Vec<ExportLogEntry>> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| Error::ImportFailed {
            path: path.to_path_buf(),
            reason: format!("cannot read export log: {}", source),
        })?;
    serde_json::from_str(&text).map_err(|e| Error::ImportFailed {
        path: path.to_path_buf(),
        reason: format!("export log is not valid JSON: {}", e),
    })
}

async fn read_sidecar(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| Error::ImportFailed {
            path: path.to_path_buf(),
            reason: format!("missing or unreadable sidecar: {}", source),
        })?;
    serde_json::from_str(&text).map_err(|e| Error::ImportFailed {
        path: path.to_path_buf(),
        reason: format!("sidecar is not a JSON object: {}", e),
    })
}

// ==========================================================================
// Tests
// ==========================================================================
