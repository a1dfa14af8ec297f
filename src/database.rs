//! Database facade
//!
//! Owns the schema registry and one document store per collection, keeps
//! them consistent, and enforces the schema on every cell write. All
//! persistence of schemas and documents goes through here:
//!
//! ```text
//! <project>/database/
//!   schemas/{collection}.yaml     1:1 with registered collections
//!   documents/{collection}.json   cells in storage form, insertion order
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::query::evaluate;
use crate::schema::{CollectionDef, FieldDef, FieldSpec, SchemaRegistry};
use crate::storage::codec;
use crate::storage::collection::Collection;
use crate::storage::document::{Document, Value};

const SCHEMAS_DIR: &str = "schemas";
const DOCUMENTS_DIR: &str = "documents";

/// Schema registry plus per-collection document stores
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Database {
    schema: SchemaRegistry,
    collections: BTreeMap<String, Collection>,
    modified: bool,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when mutations happened since the last load or save
    pub fn has_unsaved_changes(&self) -> bool {
        self.modified
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    // ==========================================================================
    // Collections
    // ==========================================================================

    /// Create an empty collection whose sole field is its string primary key
    pub fn add_collection(&mut self, name: &str, primary_key: &str) -> Result<()> {
        self.schema.add_collection(name, primary_key)?;
        self.collections
            .insert(name.to_string(), Collection::new(name));
        self.modified = true;
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.schema.has_collection(name)
    }

    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound {
                name: name.to_string(),
            })
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut Collection> {
        self.modified = true;
        self.collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound {
                name: name.to_string(),
            })
    }

    pub fn collection_def(&self, name: &str) -> Result<&CollectionDef> {
        self.schema.collection(name)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.schema.collection_names().cloned().collect()
    }

    // ==========================================================================
    // Fields
    // ==========================================================================

    /// Append one field definition; existing documents read null for it
    pub fn add_field(&mut self, collection: &str, name: &str, def: FieldDef) -> Result<()> {
        self.schema.add_field(collection, name, def)?;
        self.modified = true;
        Ok(())
    }

    /// Batch field registration; all-or-nothing across collections
    pub fn add_fields(&mut self, specs: &[FieldSpec]) -> Result<()> {
        self.schema.add_fields(specs)?;
        if !specs.is_empty() {
            self.modified = true;
        }
        Ok(())
    }

    /// Remove a field definition plus every stored cell of it. Returns the
    /// definition and the removed cells for history snapshots.
    pub fn remove_field(
        &mut self,
        collection: &str,
        name: &str,
    ) -> Result<(FieldDef, Vec<(String, Value)>)> {
        let def = self.schema.remove_field(collection, name)?;
        let saved = self.collection_mut(collection)?.clear_field(name);
        Ok((def, saved))
    }

    pub fn get_field(&self, collection: &str, name: &str) -> Result<Option<&FieldDef>> {
        self.schema.get_field(collection, name)
    }

    pub fn get_fields(
        &self,
        collection: &str,
    ) -> Result<impl Iterator<Item = (&String, &FieldDef)>> {
        self.schema.get_fields(collection)
    }

    pub fn get_visibles(&self, collection: &str) -> Result<Vec<String>> {
        self.schema.get_visibles(collection)
    }

    /// Scoped visibility update; returns the previously visible names
    pub fn set_visibles(&mut self, collection: &str, names: &[String]) -> Result<Vec<String>> {
        let before = self.schema.set_visibles(collection, names)?;
        self.modified = true;
        Ok(before)
    }

    // ==========================================================================
    // Documents
    // ==========================================================================

    /// Insert a document, type-checking every provided cell. The key is
    /// canonical: a stray cell under the primary key field is dropped.
    pub fn add_document(&mut self, collection: &str, mut doc: Document) -> Result<()> {
        let def = self.schema.collection(collection)?;
        doc.fields.remove(&def.primary_key);
        for (field, value) in &doc.fields {
            let field_def = def.field(field).ok_or_else(|| Error::FieldNotFound {
                collection: collection.to_string(),
                field: field.clone(),
            })?;
            if !codec::check_value_type(value, &field_def.field_type) {
                return Err(Error::TypeMismatch {
                    field: field.clone(),
                    expected: field_def.field_type.to_string(),
                    value: codec::format_value(value),
                });
            }
        }
        self.collection_mut(collection)?.add_document(doc)
    }

    /// Remove a document, returning it for history snapshots
    pub fn remove_document(&mut self, collection: &str, key: &str) -> Result<Document> {
        self.collection_mut(collection)?.remove_document(key)
    }

    pub fn has_document(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.collection(collection)?.has_document(key))
    }

    pub fn get_document(&self, collection: &str, key: &str) -> Result<Option<&Document>> {
        Ok(self.collection(collection)?.get(key))
    }

    /// Primary keys in insertion order
    pub fn get_documents_names(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.collection(collection)?.document_names().to_vec())
    }

    pub fn document_count(&self, collection: &str) -> Result<usize> {
        Ok(self.collection(collection)?.document_count())
    }

    /// Read one cell. The field must be declared; the primary key field
    /// reads as the document key.
    pub fn get_value(&self, collection: &str, key: &str, field: &str) -> Result<Value> {
        let def = self.schema.collection(collection)?;
        if !def.has_field(field) {
            return Err(Error::FieldNotFound {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
        if field == def.primary_key {
            let coll = self.collection(collection)?;
            if !coll.has_document(key) {
                return Err(Error::DocumentNotFound {
                    collection: collection.to_string(),
                    key: key.to_string(),
                });
            }
            return Ok(Value::String(key.to_string()));
        }
        self.collection(collection)?.get_value(key, field)
    }

    /// Write one cell after a runtime type check. A list write replaces the
    /// whole sequence. Returns the previous value.
    pub fn set_value(
        &mut self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<Value> {
        let def = self.schema.collection(collection)?;
        let field_def = def.field(field).ok_or_else(|| Error::FieldNotFound {
            collection: collection.to_string(),
            field: field.to_string(),
        })?;
        if field == def.primary_key {
            return Err(Error::Other(format!(
                "Cannot overwrite primary key field '{}' of collection '{}'",
                field, collection
            )));
        }
        if !codec::check_value_type(&value, &field_def.field_type) {
            return Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: field_def.field_type.to_string(),
                value: codec::format_value(&value),
            });
        }
        self.collection_mut(collection)?.set_value(key, field, value)
    }

    /// Documents matching a compiled predicate, in insertion order
    pub fn filter_documents<'a>(
        &'a self,
        collection: &str,
        expr: &'a scanql::Expr,
    ) -> Result<impl Iterator<Item = &'a Document> + 'a> {
        let primary_key = self.schema.collection(collection)?.primary_key.clone();
        Ok(self
            .collection(collection)?
            .documents()
            .filter(move |doc| evaluate(expr, doc, &primary_key)))
    }

    // ==========================================================================
    // Persistence
    // ==========================================================================

    /// Load schemas then documents from a database directory. A document
    /// file without a matching schema file is a hard error.
    pub async fn load(dir: &Path) -> Result<Self> {
        let mut db = Database::new();

        let schemas_dir = dir.join(SCHEMAS_DIR);
        for path in read_dir_sorted(&schemas_dir, "yaml").await? {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })?;
            let def: CollectionDef = serde_yaml::from_str(&content)?;
            db.collections
                .insert(def.name.clone(), Collection::new(&def.name));
            db.schema.insert_collection(def);
        }

        let documents_dir = dir.join(DOCUMENTS_DIR);
        for path in read_dir_sorted(&documents_dir, "json").await? {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if !db.schema.has_collection(&name) {
                return Err(Error::Other(format!(
                    "Document file '{}' has no schema file",
                    path.display()
                )));
            }
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })?;
            let rows: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_str(&content)?;
            db.load_documents(&name, rows)?;
        }

        db.modified = false;
        Ok(db)
    }

    fn load_documents(
        &mut self,
        collection: &str,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()> {
        let def = self.schema.collection(collection)?.clone();
        let coll = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                name: collection.to_string(),
            })?;
        for row in rows {
            let key = row
                .get(&def.primary_key)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::Other(format!(
                        "Document in '{}' is missing its primary key '{}'",
                        collection, def.primary_key
                    ))
                })?
                .to_string();
            let mut doc = Document::new(key);
            for (field, json) in &row {
                if field == &def.primary_key {
                    continue;
                }
                let field_def = def.field(field).ok_or_else(|| Error::FieldNotFound {
                    collection: collection.to_string(),
                    field: field.clone(),
                })?;
                let value = codec::from_storage(json, &field_def.field_type)
                    .map_err(|e| e.for_field(field))?;
                if !value.is_null() {
                    doc.fields.insert(field.clone(), value);
                }
            }
            coll.add_document(doc)?;
        }
        Ok(())
    }

    /// Write every schema and document file under a database directory
    pub async fn save(&mut self, dir: &Path) -> Result<()> {
        let schemas_dir = dir.join(SCHEMAS_DIR);
        let documents_dir = dir.join(DOCUMENTS_DIR);
        fs::create_dir_all(&schemas_dir).await?;
        fs::create_dir_all(&documents_dir).await?;

        for name in self.collection_names() {
            let def = self.schema.collection(&name)?;
            let schema_path = schemas_dir.join(format!("{}.yaml", name));
            let yaml = serde_yaml::to_string(def).map_err(|e| Error::YamlSerializeError {
                message: e.to_string(),
            })?;
            fs::write(&schema_path, yaml)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: schema_path.clone(),
                    source,
                })?;

            let rows = self.document_rows(&name)?;
            let documents_path = documents_dir.join(format!("{}.json", name));
            let json = serde_json::to_string_pretty(&rows)?;
            fs::write(&documents_path, json)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: documents_path.clone(),
                    source,
                })?;
        }

        self.modified = false;
        Ok(())
    }

    fn document_rows(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let def = self.schema.collection(collection)?;
        let coll = self.collection(collection)?;
        let mut rows = Vec::with_capacity(coll.document_count());
        for doc in coll.documents() {
            let mut row = serde_json::Map::new();
            row.insert(
                def.primary_key.clone(),
                serde_json::Value::String(doc.key.clone()),
            );
            for (field, value) in &doc.fields {
                row.insert(field.clone(), codec::to_storage(value));
            }
            rows.push(serde_json::Value::Object(row));
        }
        Ok(rows)
    }
}

/// Paths of files with the given extension inside a directory, sorted.
/// A missing directory reads as empty.
async fn read_dir_sorted(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == extension).unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use tempfile::TempDir;

    fn scans_db() -> Database {
        let mut db = Database::new();
        db.add_collection("current", "FileName").unwrap();
        db.add_field(
            "current",
            "Age",
            FieldDef {
                field_type: FieldType::Int,
                ..Default::default()
            },
        )
        .unwrap();
        db
    }

    #[test]
    fn test_set_value_enforces_the_declared_type() {
        let mut db = scans_db();
        db.add_document("current", Document::new("a.nii")).unwrap();

        assert!(db
            .set_value("current", "a.nii", "Age", Value::Int(34))
            .is_ok());
        assert!(matches!(
            db.set_value("current", "a.nii", "Age", Value::String("old".into())),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_get_value_requires_declared_field() {
        let mut db = scans_db();
        db.add_document("current", Document::new("a.nii")).unwrap();
        assert!(matches!(
            db.get_value("current", "a.nii", "Ghost"),
            Err(Error::FieldNotFound { .. })
        ));
        // The primary key reads as the document key
        assert_eq!(
            db.get_value("current", "a.nii", "FileName").unwrap(),
            Value::String("a.nii".to_string())
        );
    }

    #[test]
    fn test_add_document_rejects_undeclared_cells() {
        let mut db = scans_db();
        let mut doc = Document::new("a.nii");
        doc.set("Ghost", 1i64);
        assert!(matches!(
            db.add_document("current", doc),
            Err(Error::FieldNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut db = scans_db();
        db.add_field(
            "current",
            "AcquisitionDate",
            FieldDef {
                field_type: FieldType::Date,
                ..Default::default()
            },
        )
        .unwrap();
        let mut doc = Document::new("data/raw_data/a.nii");
        doc.set("Age", 34i64);
        doc.set(
            "AcquisitionDate",
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        );
        db.add_document("current", doc).unwrap();

        db.save(tmp.path()).await.unwrap();
        assert!(!db.has_unsaved_changes());

        let loaded = Database::load(tmp.path()).await.unwrap();
        assert_eq!(loaded, db);
        // The date cell came back typed, not as a string
        assert_eq!(
            loaded
                .get_value("current", "data/raw_data/a.nii", "AcquisitionDate")
                .unwrap(),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[tokio::test]
    async fn test_document_file_without_schema_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("documents")).await.unwrap();
        fs::write(tmp.path().join("documents/ghost.json"), "[]")
            .await
            .unwrap();
        assert!(Database::load(tmp.path()).await.is_err());
    }
}
