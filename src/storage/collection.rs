//! Collection - an ordered set of documents keyed by primary key
//!
//! Collections are analogous to tables in a relational database. Documents
//! keep their insertion order, which `get_documents_names` reports; lookups
//! go through a key map. The store is schema-unaware: type checks happen in
//! the database facade before a write reaches it.

use super::document::{Document, Value};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A collection of documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    /// Name of the collection
    pub name: String,
    /// Documents by primary key
    documents: HashMap<String, Document>,
    /// Primary keys in insertion order
    order: Vec<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Insert a new document; its key must be unused
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        if self.documents.contains_key(&doc.key) {
            return Err(Error::DocumentAlreadyExists {
                collection: self.name.clone(),
                key: doc.key.clone(),
            });
        }
        self.order.push(doc.key.clone());
        self.documents.insert(doc.key.clone(), doc);
        Ok(())
    }

    /// Remove a document, returning it for history snapshots
    pub fn remove_document(&mut self, key: &str) -> Result<Document> {
        let doc = self
            .documents
            .remove(key)
            .ok_or_else(|| Error::DocumentNotFound {
                collection: self.name.clone(),
                key: key.to_string(),
            })?;
        self.order.retain(|k| k != key);
        Ok(doc)
    }

    /// Explicit existence query
    pub fn has_document(&self, key: &str) -> bool {
        self.documents.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.documents.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Document> {
        self.documents.get_mut(key)
    }

    /// Primary keys in insertion order
    pub fn document_names(&self) -> &[String] {
        &self.order
    }

    /// Documents in insertion order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|key| self.documents.get(key))
    }

    pub fn document_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Read one cell; a sparse cell reads as null
    pub fn get_value(&self, key: &str, field: &str) -> Result<Value> {
        let doc = self.get(key).ok_or_else(|| Error::DocumentNotFound {
            collection: self.name.clone(),
            key: key.to_string(),
        })?;
        Ok(doc.value(field))
    }

    /// Write one cell, returning the previous value. A null write clears
    /// the cell so the map stays sparse.
    pub fn set_value(&mut self, key: &str, field: &str, value: Value) -> Result<Value> {
        let name = self.name.clone();
        let doc = self
            .documents
            .get_mut(key)
            .ok_or_else(|| Error::DocumentNotFound {
                collection: name,
                key: key.to_string(),
            })?;
        let old = if value.is_null() {
            doc.fields.remove(field)
        } else {
            doc.fields.insert(field.to_string(), value)
        };
        Ok(old.unwrap_or(Value::Null))
    }

    /// Drop a field's cells from every document (field removal path)
    pub fn clear_field(&mut self, field: &str) -> Vec<(String, Value)> {
        let mut removed = Vec::new();
        for key in &self.order {
            if let Some(doc) = self.documents.get_mut(key) {
                if let Some(value) = doc.fields.remove(field) {
                    removed.push((key.clone(), value));
                }
            }
        }
        removed
    }
}
