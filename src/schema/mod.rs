//! Schema definitions for scanbase collections
//!
//! A collection schema maps field names to typed field definitions:
//! - Field types (scalars, dates, JSON, typed lists)
//! - Visibility (which fields the documentation views show)
//! - Origin (built-in vs user-created)
//! - Optional measurement unit and default value
//!
//! Schemas are stored in `<project>/database/schemas/{collection}.yaml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// A field type in the schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Time,
    /// Free-form JSON payload (brick inputs/outputs)
    Json,
    List(Box<FieldType>),
}

impl Default for FieldType {
    fn default() -> Self {
        Self::String
    }
}

impl FieldType {
    /// Element type of a list field, or `None` for scalars
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            FieldType::List(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Date => write!(f, "date"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Time => write!(f, "time"),
            FieldType::Json => write!(f, "json"),
            FieldType::List(inner) => write!(f, "list of {}", inner),
        }
    }
}

/// Measurement unit attached to a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Unit {
    #[serde(rename = "ms")]
    Ms,
    #[serde(rename = "mm")]
    Mm,
    #[serde(rename = "degree")]
    Degree,
    #[serde(rename = "Hz/pixel")]
    HzPixel,
    #[serde(rename = "MHz")]
    Mhz,
}

impl Unit {
    /// Look up a unit by its display name (as found in export sidecars)
    pub fn from_name(name: &str) -> Option<Unit> {
        match name {
            "ms" => Some(Unit::Ms),
            "mm" => Some(Unit::Mm),
            "degree" => Some(Unit::Degree),
            "Hz/pixel" => Some(Unit::HzPixel),
            "MHz" => Some(Unit::Mhz),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Ms => "ms",
            Unit::Mm => "mm",
            Unit::Degree => "degree",
            Unit::HzPixel => "Hz/pixel",
            Unit::Mhz => "MHz",
        };
        write!(f, "{}", s)
    }
}

/// Whether a field ships with the project model or was created by a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrigin {
    Builtin,
    #[default]
    User,
}

/// Definition of a single field; the owning map supplies the name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    /// Field type
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Whether documentation views show this field
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Built-in or user-created
    #[serde(default)]
    pub origin: FieldOrigin,
    /// Optional measurement unit
    #[serde(default)]
    pub unit: Option<Unit>,
    /// Default cell value, in storage form (same JSON shape as document cells)
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_visible() -> bool {
    true
}

impl Default for FieldDef {
    fn default() -> Self {
        Self {
            field_type: FieldType::String,
            description: None,
            visible: true,
            origin: FieldOrigin::User,
            unit: None,
            default: None,
        }
    }
}

impl FieldDef {
    /// A visible built-in string field, the shape of most built-in tags
    pub fn builtin(field_type: FieldType) -> Self {
        Self {
            field_type,
            origin: FieldOrigin::Builtin,
            ..Default::default()
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One field registration in a batch, naming its collection
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub collection: String,
    pub name: String,
    pub def: FieldDef,
}

/// Schema of one collection
///
/// Fields live in a `BTreeMap` so every name-ordered listing
/// (`get_visibles`, schema files) falls out of plain iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionDef {
    /// Collection name
    pub name: String,
    /// Name of the primary key field (always string-typed)
    pub primary_key: String,
    /// Field definitions keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl CollectionDef {
    /// Create a collection whose sole field is its string primary key
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        let mut fields = BTreeMap::new();
        fields.insert(primary_key.clone(), FieldDef::builtin(FieldType::String));
        Self {
            name: name.into(),
            primary_key,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Visible fields, ordered by name
    pub fn visible_fields(&self) -> impl Iterator<Item = (&String, &FieldDef)> {
        self.fields.iter().filter(|(_, def)| def.visible)
    }

    /// Set visibility true for exactly the named fields, false for all others.
    /// Names not present in this collection are ignored (visibility is scoped
    /// to the field's own collection). Returns the previously visible names.
    pub fn set_visibles(&mut self, names: &[String]) -> Vec<String> {
        let before: Vec<String> = self
            .visible_fields()
            .map(|(name, _)| name.clone())
            .collect();
        for (name, def) in self.fields.iter_mut() {
            def.visible = names.contains(name);
        }
        before
    }
}

/// Registry of all collection schemas in a project database
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchemaRegistry {
    collections: BTreeMap<String, CollectionDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection whose sole field is the primary key
    pub fn add_collection(&mut self, name: &str, primary_key: &str) -> Result<()> {
        if self.collections.contains_key(name) {
            return Err(Error::CollectionAlreadyExists {
                name: name.to_string(),
            });
        }
        self.collections
            .insert(name.to_string(), CollectionDef::new(name, primary_key));
        Ok(())
    }

    /// Re-insert a loaded collection definition (project open path)
    pub fn insert_collection(&mut self, def: CollectionDef) {
        self.collections.insert(def.name.clone(), def);
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionDef> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound {
                name: name.to_string(),
            })
    }

    pub fn collection_mut(&mut self, name: &str) -> Result<&mut CollectionDef> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Collection names, ordered
    pub fn collection_names(&self) -> impl Iterator<Item = &String> {
        self.collections.keys()
    }

    /// Append one field definition to a collection
    pub fn add_field(&mut self, collection: &str, name: &str, def: FieldDef) -> Result<()> {
        let coll = self.collection_mut(collection)?;
        if coll.has_field(name) {
            return Err(Error::FieldAlreadyExists {
                collection: collection.to_string(),
                field: name.to_string(),
            });
        }
        coll.fields.insert(name.to_string(), def);
        Ok(())
    }

    /// Batch form of `add_field`: either every spec is added or none is.
    /// The whole batch is validated against the registry and against itself
    /// before the first insertion.
    pub fn add_fields(&mut self, specs: &[FieldSpec]) -> Result<()> {
        let mut seen: Vec<(&str, &str)> = Vec::with_capacity(specs.len());
        for spec in specs {
            let coll = self.collection(&spec.collection)?;
            if coll.has_field(&spec.name) {
                return Err(Error::FieldAlreadyExists {
                    collection: spec.collection.clone(),
                    field: spec.name.clone(),
                });
            }
            let key = (spec.collection.as_str(), spec.name.as_str());
            if seen.contains(&key) {
                return Err(Error::FieldAlreadyExists {
                    collection: spec.collection.clone(),
                    field: spec.name.clone(),
                });
            }
            seen.push(key);
        }
        for spec in specs {
            // Validated above; collections cannot vanish between the passes
            if let Some(coll) = self.collections.get_mut(&spec.collection) {
                coll.fields.insert(spec.name.clone(), spec.def.clone());
            }
        }
        Ok(())
    }

    /// Remove a field definition, returning it for history snapshots
    pub fn remove_field(&mut self, collection: &str, name: &str) -> Result<FieldDef> {
        let coll = self.collection_mut(collection)?;
        if name == coll.primary_key {
            return Err(Error::Other(format!(
                "Cannot remove primary key field '{}' of collection '{}'",
                name, collection
            )));
        }
        coll.fields
            .remove(name)
            .ok_or_else(|| Error::FieldNotFound {
                collection: collection.to_string(),
                field: name.to_string(),
            })
    }

    pub fn get_field(&self, collection: &str, name: &str) -> Result<Option<&FieldDef>> {
        Ok(self.collection(collection)?.field(name))
    }

    /// All fields of a collection, ordered by name
    pub fn get_fields(&self, collection: &str) -> Result<impl Iterator<Item = (&String, &FieldDef)>> {
        Ok(self.collection(collection)?.fields.iter())
    }

    /// Names of visible fields, ordered by name
    pub fn get_visibles(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .collection(collection)?
            .visible_fields()
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Scoped visibility update; returns the previously visible names
    pub fn set_visibles(&mut self, collection: &str, names: &[String]) -> Result<Vec<String>> {
        Ok(self.collection_mut(collection)?.set_visibles(names))
    }
}
