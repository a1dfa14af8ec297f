//! Dual-collection project model
//!
//! A project owns three collections. `current` is the working copy a data
//! browser shows and edits; `initial` keeps the pristine values captured at
//! import time; `brick` records one document per processing step. Schema and
//! value operations initiated by a user apply to `current` and `initial`
//! together, never to only one side, and each logged action pushes exactly
//! one undo entry.
//!
//! On disk a project is a directory:
//!
//! ```text
//! <project>/
//!   properties/properties.yaml
//!   database/schemas/<collection>.yaml
//!   database/documents/<collection>.json
//!   filters/<name>.json
//!   data/raw_data/
//! ```

pub mod bricks;
pub mod import;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::checksum;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::history::{CellWrite, History, HistoryEntry, VisibilityChange};
use crate::query;
use crate::schema::{FieldDef, FieldOrigin, FieldSpec, FieldType};
use crate::storage::codec;
use crate::storage::document::{Document, Value};

// ==========================================================================
// Names
// ==========================================================================

pub const COLLECTION_CURRENT: &str = "current";
pub const COLLECTION_INITIAL: &str = "initial";
pub const COLLECTION_BRICK: &str = "brick";

pub const TAG_FILENAME: &str = "FileName";
pub const TAG_TYPE: &str = "Type";
pub const TAG_CHECKSUM: &str = "Checksum";
pub const TAG_BRICKS: &str = "Bricks";

pub const BRICK_ID: &str = "ID";
pub const BRICK_NAME: &str = "Name";
pub const BRICK_INIT: &str = "Init";
pub const BRICK_INIT_TIME: &str = "Init Time";
pub const BRICK_EXEC: &str = "Exec";
pub const BRICK_EXEC_TIME: &str = "Exec Time";
pub const BRICK_INPUTS: &str = "Inputs";
pub const BRICK_OUTPUTS: &str = "Outputs";

pub const TYPE_SCAN: &str = "Scan";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_NOT_DONE: &str = "Not Done";

pub const PROPERTIES_DIR: &str = "properties";
pub const PROPERTIES_FILE: &str = "properties.yaml";
pub const DATABASE_DIR: &str = "database";
pub const FILTERS_DIR: &str = "filters";
pub const RAW_DATA_DIR: &str = "data/raw_data";

fn properties_path(root: &Path) -> PathBuf {
    root.join(PROPERTIES_DIR).join(PROPERTIES_FILE)
}

/// Current local time, truncated to the microsecond precision the codec
/// keeps, so recorded timestamps survive a save/open round trip unchanged
pub(crate) fn now_micros() -> chrono::NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

// ==========================================================================
// Properties
// ==========================================================================

/// Project-level settings stored in `properties/properties.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Properties {
    pub name: String,
    /// Creation timestamp, in the codec's datetime rendering
    pub date: String,
    #[serde(default = "default_sorted_tag")]
    pub sorted_tag: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

fn default_sorted_tag() -> String {
    TAG_FILENAME.to_string()
}

fn default_sort_order() -> String {
    "ascending".to_string()
}

impl Properties {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            date: codec::format_value(&Value::DateTime(now_micros())),
            sorted_tag: default_sorted_tag(),
            sort_order: default_sort_order(),
        }
    }
}

// ==========================================================================
// Project
// ==========================================================================

/// One cell edit in a [`Project::set_values`] batch, applied to the
/// current collection
#[derive(Debug, Clone, PartialEq)]
pub struct ValueWrite {
    pub key: String,
    pub field: String,
    pub value: Value,
}

/// An open project: database, undo/redo log, saved filters and settings
#[derive(Debug)]
pub struct Project {
    pub(crate) root: PathBuf,
    pub properties: Properties,
    pub(crate) database: Database,
    pub(crate) history: History,
    pub(crate) filters: BTreeMap<String, scanql::Filter>,
}

impl Project {
    /// Initialize a project directory with the three built-in collections
    /// and write everything to disk. Fails if the directory already holds
    /// a project.
    pub async fn create(root: &Path, name: &str) -> Result<Self> {
        if fs::try_exists(&properties_path(root)).await.unwrap_or(false) {
            return Err(Error::ProjectAlreadyExists {
                path: root.to_path_buf(),
            });
        }
        for dir in [
            root.join(PROPERTIES_DIR),
            root.join(DATABASE_DIR),
            root.join(FILTERS_DIR),
            root.join(RAW_DATA_DIR),
        ] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: dir.clone(),
                    source,
                })?;
        }

        let mut database = Database::new();
        bootstrap_collections(&mut database)?;
        let mut project = Self {
            root: root.to_path_buf(),
            properties: Properties::new(name),
            database,
            history: History::new(),
            filters: BTreeMap::new(),
        };
        project.save().await?;
        info!(name, root = %project.root.display(), "created project");
        Ok(project)
    }

    /// Open an existing project directory. Schemas load before documents;
    /// the undo/redo log always starts empty.
    pub async fn open(root: &Path) -> Result<Self> {
        let path = properties_path(root);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ProjectNotFound {
                    path: root.to_path_buf(),
                });
            }
            Err(source) => return Err(Error::FileReadError { path, source }),
        };
        let properties: Properties = serde_yaml::from_str(&text)?;
        let database = Database::load(&root.join(DATABASE_DIR)).await?;
        let filters = load_filters(&root.join(FILTERS_DIR)).await?;
        debug!(name = properties.name, "opened project");
        Ok(Self {
            root: root.to_path_buf(),
            properties,
            database,
            history: History::new(),
            filters,
        })
    }

    /// Write properties, schemas and documents back to disk
    pub async fn save(&mut self) -> Result<()> {
        self.database.save(&self.root.join(DATABASE_DIR)).await?;
        let path = properties_path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let yaml =
            serde_yaml::to_string(&self.properties).map_err(|e| Error::YamlSerializeError {
                message: e.to_string(),
            })?;
        fs::write(&path, yaml)
            .await
            .map_err(|source| Error::FileWriteError { path, source })?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_data_dir(&self) -> PathBuf {
        self.root.join(RAW_DATA_DIR)
    }

    /// Read access for browsers and the CLI; mutations go through the
    /// project-level operations so they hit both collections and the log
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.database.has_unsaved_changes()
    }

    // ======================================================================
    // Scans
    // ======================================================================

    /// Register scan files already inside the project directory. Each key
    /// is a project-relative path; the file is hashed and identical
    /// documents land in `current` and `initial`. One `add_scans` history
    /// entry covers the whole batch.
    pub async fn add_scans(&mut self, keys: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.as_str())
                || self.database.has_document(COLLECTION_CURRENT, key)?
            {
                return Err(Error::DocumentAlreadyExists {
                    collection: COLLECTION_CURRENT.to_string(),
                    key: key.clone(),
                });
            }
        }

        let mut docs = Vec::with_capacity(keys.len());
        for key in keys {
            let digest = checksum::checksum_file(&self.root.join(key)).await?;
            let mut doc = Document::new(key.clone());
            doc.set(TAG_TYPE, TYPE_SCAN);
            doc.set(TAG_CHECKSUM, digest);
            docs.push(doc);
        }
        self.insert_scan_documents(&docs)?;
        info!(count = docs.len(), "added scans");
        Ok(keys.to_vec())
    }

    /// Insert identical documents into both scan collections and log one
    /// `add_scans` entry. Used by both direct adds and the import pipeline.
    pub(crate) fn insert_scan_documents(&mut self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            self.database.add_document(COLLECTION_CURRENT, doc.clone())?;
            self.database.add_document(COLLECTION_INITIAL, doc.clone())?;
        }
        self.history.record(HistoryEntry::AddScans {
            current: docs.to_vec(),
            initial: docs.to_vec(),
        });
        Ok(())
    }

    /// Remove scans from both collections, snapshotting the removed
    /// documents so undo can restore them
    pub fn remove_scans(&mut self, keys: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.as_str())
                || !self.database.has_document(COLLECTION_CURRENT, key)?
            {
                return Err(Error::DocumentNotFound {
                    collection: COLLECTION_CURRENT.to_string(),
                    key: key.clone(),
                });
            }
        }

        let mut current = Vec::with_capacity(keys.len());
        let mut initial = Vec::with_capacity(keys.len());
        for key in keys {
            current.push(self.database.remove_document(COLLECTION_CURRENT, key)?);
            initial.push(self.database.remove_document(COLLECTION_INITIAL, key)?);
        }
        self.history
            .record(HistoryEntry::RemoveScans { current, initial });
        info!(count = keys.len(), "removed scans");
        Ok(())
    }

    /// Compare every current scan's stored checksum against the bytes on
    /// disk. A missing backing file is flagged unconditionally. Returns the
    /// flagged keys; mutates nothing.
    pub async fn verify_scans(&self) -> Result<Vec<String>> {
        let mut flagged = Vec::new();
        for key in self.database.get_documents_names(COLLECTION_CURRENT)? {
            let stored = self
                .database
                .get_value(COLLECTION_CURRENT, &key, TAG_CHECKSUM)?;
            let path = self.root.join(&key);
            match fs::try_exists(&path).await {
                Ok(true) => {
                    let digest = checksum::checksum_file(&path).await?;
                    if stored != Value::String(digest) {
                        flagged.push(key);
                    }
                }
                _ => flagged.push(key),
            }
        }
        Ok(flagged)
    }

    /// Scan files under `data/raw_data` that no current document points at
    /// yet, as sorted project-relative keys
    pub fn unregistered_scans(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(self.raw_data_dir())
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path.extension().map(|e| e == "nii").unwrap_or(false)
            {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative.to_string_lossy().replace('\\', "/");
            if !self.database.has_document(COLLECTION_CURRENT, &key)? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    // ======================================================================
    // Values
    // ======================================================================

    /// Batch cell edit on the current collection. Every write is validated
    /// before any is applied, so a bad row leaves the table untouched. One
    /// `modified_values` entry covers the batch.
    pub fn set_values(&mut self, edits: &[ValueWrite]) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let def = self.database.collection_def(COLLECTION_CURRENT)?.clone();

        let mut promoted = Vec::with_capacity(edits.len());
        for edit in edits {
            if !self.database.has_document(COLLECTION_CURRENT, &edit.key)? {
                return Err(Error::DocumentNotFound {
                    collection: COLLECTION_CURRENT.to_string(),
                    key: edit.key.clone(),
                });
            }
            let field_def = def.field(&edit.field).ok_or_else(|| Error::FieldNotFound {
                collection: COLLECTION_CURRENT.to_string(),
                field: edit.field.clone(),
            })?;
            if edit.field == def.primary_key {
                return Err(Error::Other(format!(
                    "Cannot overwrite primary key field '{}' of collection '{}'",
                    edit.field, COLLECTION_CURRENT
                )));
            }
            let value = codec::promote_to_list(edit.value.clone(), &field_def.field_type);
            if !codec::check_value_type(&value, &field_def.field_type) {
                return Err(Error::TypeMismatch {
                    field: edit.field.clone(),
                    expected: field_def.field_type.to_string(),
                    value: codec::format_value(&value),
                });
            }
            promoted.push(value);
        }

        let mut writes = Vec::with_capacity(edits.len());
        for (edit, value) in edits.iter().zip(promoted) {
            let old =
                self.database
                    .set_value(COLLECTION_CURRENT, &edit.key, &edit.field, value.clone())?;
            writes.push(CellWrite {
                collection: COLLECTION_CURRENT.to_string(),
                key: edit.key.clone(),
                field: edit.field.clone(),
                old,
                new: value,
            });
        }
        self.history.record(HistoryEntry::ModifiedValues { writes });
        Ok(())
    }

    // ======================================================================
    // Tags
    // ======================================================================

    /// Register a user tag on both scan collections. A declared default
    /// value is written into every existing document; it is decoded before
    /// the schema grows, so a bad default leaves nothing registered.
    pub fn add_tag(&mut self, name: &str, def: FieldDef) -> Result<()> {
        self.ensure_tag_absent(name)?;
        let default = match &def.default {
            Some(json) => {
                let value =
                    codec::from_storage(json, &def.field_type).map_err(|e| e.for_field(name))?;
                if value.is_null() {
                    None
                } else {
                    Some(value)
                }
            }
            None => None,
        };
        let specs = both_collection_specs(name, def);
        self.database.add_fields(&specs)?;

        let mut writes = Vec::new();
        if let Some(value) = default {
            for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
                for key in self.database.get_documents_names(collection)? {
                    let old = self.database.set_value(collection, &key, name, value.clone())?;
                    writes.push(CellWrite {
                        collection: collection.to_string(),
                        key,
                        field: name.to_string(),
                        old,
                        new: value.clone(),
                    });
                }
            }
        }
        self.history.record(HistoryEntry::AddTag { specs, writes });
        Ok(())
    }

    /// Copy a tag's definition and column into a new user tag, on both
    /// scan collections
    pub fn clone_tag(&mut self, new_name: &str, source: &str) -> Result<()> {
        self.ensure_tag_absent(new_name)?;
        let source_def = self
            .database
            .get_field(COLLECTION_CURRENT, source)?
            .ok_or_else(|| Error::FieldNotFound {
                collection: COLLECTION_CURRENT.to_string(),
                field: source.to_string(),
            })?
            .clone();
        let def = FieldDef {
            origin: FieldOrigin::User,
            ..source_def
        };
        let specs = both_collection_specs(new_name, def);
        self.database.add_fields(&specs)?;

        let mut writes = Vec::new();
        for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
            for key in self.database.get_documents_names(collection)? {
                let value = self.database.get_value(collection, &key, source)?;
                if value.is_null() {
                    continue;
                }
                let old = self
                    .database
                    .set_value(collection, &key, new_name, value.clone())?;
                writes.push(CellWrite {
                    collection: collection.to_string(),
                    key,
                    field: new_name.to_string(),
                    old,
                    new: value,
                });
            }
        }
        self.history.record(HistoryEntry::AddTag { specs, writes });
        Ok(())
    }

    /// Drop tags from both scan collections, keeping their cells in the
    /// history entry so undo can restore the columns
    pub fn remove_tags(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let primary_key = self
            .database
            .collection_def(COLLECTION_CURRENT)?
            .primary_key
            .clone();
        let mut seen = HashSet::new();
        for name in names {
            if *name == primary_key {
                return Err(Error::Other(format!(
                    "Cannot remove primary key field '{}'",
                    name
                )));
            }
            for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
                if !seen.insert((collection, name.as_str()))
                    || self.database.get_field(collection, name)?.is_none()
                {
                    return Err(Error::FieldNotFound {
                        collection: collection.to_string(),
                        field: name.clone(),
                    });
                }
            }
        }

        let mut specs = Vec::new();
        let mut saved = Vec::new();
        for name in names {
            for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
                let (def, cells) = self.database.remove_field(collection, name)?;
                specs.push(FieldSpec {
                    collection: collection.to_string(),
                    name: name.clone(),
                    def,
                });
                saved.extend(cells.into_iter().map(|(key, old)| CellWrite {
                    collection: collection.to_string(),
                    key,
                    field: name.clone(),
                    old,
                    new: Value::Null,
                }));
            }
        }
        self.history.record(HistoryEntry::RemoveTags { specs, saved });
        Ok(())
    }

    /// Replace the visible-tag set on both scan collections; names a
    /// collection does not declare are ignored on that side
    pub fn set_visibles(&mut self, names: &[String]) -> Result<()> {
        let mut changes = Vec::with_capacity(2);
        for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
            let before = self.database.set_visibles(collection, names)?;
            let after = self.database.get_visibles(collection)?;
            changes.push(VisibilityChange {
                collection: collection.to_string(),
                before,
                after,
            });
        }
        self.history
            .record(HistoryEntry::ModifiedVisibilities { changes });
        Ok(())
    }

    pub fn visible_tags(&self) -> Result<Vec<String>> {
        self.database.get_visibles(COLLECTION_CURRENT)
    }

    fn ensure_tag_absent(&self, name: &str) -> Result<()> {
        for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
            if self.database.get_field(collection, name)?.is_some() {
                return Err(Error::FieldAlreadyExists {
                    collection: collection.to_string(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }

    // ======================================================================
    // Undo / redo
    // ======================================================================

    /// Take back the most recent logged action; returns its kind
    pub fn undo(&mut self) -> Result<&'static str> {
        let kind = self.history.undo(&mut self.database)?;
        info!(kind, "undid last action");
        Ok(kind)
    }

    /// Re-apply the most recently undone action; returns its kind
    pub fn redo(&mut self) -> Result<&'static str> {
        let kind = self.history.redo(&mut self.database)?;
        info!(kind, "redid last undone action");
        Ok(kind)
    }

    // ======================================================================
    // Searches
    // ======================================================================

    /// Keys of current scans matching a rapid-search text over the visible
    /// tags, in insertion order
    pub fn search_rapid(&self, text: &str) -> Result<Vec<String>> {
        let candidates = self.database.get_visibles(COLLECTION_CURRENT)?;
        let scope = self.database.get_documents_names(COLLECTION_CURRENT)?;
        let expr = query::compile_rapid_search(text, &candidates, TAG_FILENAME, &scope);
        self.matching_keys(&expr)
    }

    /// Keys of current scans matching a saved or ad-hoc filter
    pub fn search_advanced(&self, filter: &scanql::Filter) -> Result<Vec<String>> {
        let scope = self.database.get_documents_names(COLLECTION_CURRENT)?;
        let expr = query::compile_filter(filter, TAG_FILENAME, &scope)?;
        self.matching_keys(&expr)
    }

    fn matching_keys(&self, expr: &scanql::Expr) -> Result<Vec<String>> {
        Ok(self
            .database
            .filter_documents(COLLECTION_CURRENT, expr)?
            .map(|doc| doc.key.clone())
            .collect())
    }

    // ======================================================================
    // Saved filters
    // ======================================================================

    /// Persist a filter under `filters/<name>.json`, replacing any previous
    /// filter of the same name
    pub async fn save_filter(&mut self, filter: &scanql::Filter) -> Result<()> {
        validate_filter_name(&filter.name)?;
        if !filter.is_well_formed() {
            return Err(Error::InvalidFilter {
                message: format!("filter '{}' has mismatched row arrays", filter.name),
            });
        }
        let dir = self.root.join(FILTERS_DIR);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::FileWriteError {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(format!("{}.json", filter.name));
        let json = serde_json::to_string_pretty(filter)?;
        fs::write(&path, json)
            .await
            .map_err(|source| Error::FileWriteError { path, source })?;
        self.filters.insert(filter.name.clone(), filter.clone());
        Ok(())
    }

    /// Forget a saved filter and delete its file
    pub async fn delete_filter(&mut self, name: &str) -> Result<()> {
        if self.filters.remove(name).is_none() {
            return Err(Error::Other(format!("No saved filter named '{}'", name)));
        }
        let path = self.root.join(FILTERS_DIR).join(format!("{}.json", name));
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::FileWriteError { path, source }),
        }
    }

    /// Saved filters, ordered by name
    pub fn filters(&self) -> impl Iterator<Item = &scanql::Filter> {
        self.filters.values()
    }

    pub fn get_filter(&self, name: &str) -> Option<&scanql::Filter> {
        self.filters.get(name)
    }
}

// ==========================================================================
// Bootstrap and helpers
// ==========================================================================

/// The three built-in collections and their built-in fields
fn bootstrap_collections(db: &mut Database) -> Result<()> {
    db.add_collection(COLLECTION_CURRENT, TAG_FILENAME)?;
    db.add_collection(COLLECTION_INITIAL, TAG_FILENAME)?;
    db.add_collection(COLLECTION_BRICK, BRICK_ID)?;

    let mut specs = Vec::new();
    for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
        specs.push(FieldSpec {
            collection: collection.to_string(),
            name: TAG_TYPE.to_string(),
            def: FieldDef::builtin(FieldType::String),
        });
        specs.push(FieldSpec {
            collection: collection.to_string(),
            name: TAG_CHECKSUM.to_string(),
            def: FieldDef::builtin(FieldType::String).hidden(),
        });
        specs.push(FieldSpec {
            collection: collection.to_string(),
            name: TAG_BRICKS.to_string(),
            def: FieldDef::builtin(FieldType::List(Box::new(FieldType::String))).hidden(),
        });
    }
    for (name, field_type, visible) in [
        (BRICK_NAME, FieldType::String, true),
        (BRICK_INIT, FieldType::String, false),
        (BRICK_INIT_TIME, FieldType::DateTime, false),
        (BRICK_EXEC, FieldType::String, false),
        (BRICK_EXEC_TIME, FieldType::DateTime, false),
        (BRICK_INPUTS, FieldType::Json, false),
        (BRICK_OUTPUTS, FieldType::Json, false),
    ] {
        let def = if visible {
            FieldDef::builtin(field_type)
        } else {
            FieldDef::builtin(field_type).hidden()
        };
        specs.push(FieldSpec {
            collection: COLLECTION_BRICK.to_string(),
            name: name.to_string(),
            def,
        });
    }
    db.add_fields(&specs)
}

fn both_collection_specs(name: &str, def: FieldDef) -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            collection: COLLECTION_CURRENT.to_string(),
            name: name.to_string(),
            def: def.clone(),
        },
        FieldSpec {
            collection: COLLECTION_INITIAL.to_string(),
            name: name.to_string(),
            def,
        },
    ]
}

fn validate_filter_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(Error::InvalidFilter {
            message: format!("'{}' is not a usable filter name", name),
        });
    }
    Ok(())
}

async fn load_filters(dir: &Path) -> Result<BTreeMap<String, scanql::Filter>> {
    let mut filters = BTreeMap::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(filters),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let text = fs::read_to_string(&path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })?;
            let filter: scanql::Filter = serde_json::from_str(&text)?;
            filters.insert(filter.name.clone(), filter);
        }
    }
    Ok(filters)
}

// ==========================================================================
// Tests
// ==========================================================================
