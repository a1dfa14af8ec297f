//! Undo/redo log
//!
//! Every completed mutation records one [`HistoryEntry`] carrying enough
//! state to run it in either direction. The log keeps two stacks: `undo`
//! holds applied entries, newest last; `redo` holds entries taken back by
//! [`History::undo`]. Recording a fresh entry clears the redo stack, so a
//! mutation can never sit on both stacks at once.
//!
//! The log lives in memory only. Closing a project drops it.

use crate::database::Database;
use crate::error::{Error, Result};
use crate::project::{COLLECTION_CURRENT, COLLECTION_INITIAL};
use crate::schema::FieldSpec;
use crate::storage::document::{Document, Value};

// ==========================================================================
// Entry payloads
// ==========================================================================

/// One cell overwrite, keeping both sides of the write
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub collection: String,
    pub key: String,
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// A visible-field swap on one collection
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    pub collection: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// One reversible mutation. The set is closed: everything a project can
/// undo is one of these kinds, and both replay directions are written out
/// below, so a new kind fails to compile until its replay exists.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// Scans added to the current and initial collections, snapshotted
    /// with every cell they carried on insert
    AddScans {
        current: Vec<Document>,
        initial: Vec<Document>,
    },
    /// Scans removed from both collections, snapshotted at removal time
    RemoveScans {
        current: Vec<Document>,
        initial: Vec<Document>,
    },
    /// Tags registered, plus the cells written right after (cloning a tag
    /// copies the source column into the new one)
    AddTag {
        specs: Vec<FieldSpec>,
        writes: Vec<CellWrite>,
    },
    /// Tags dropped, with every cell they held when removed
    RemoveTags {
        specs: Vec<FieldSpec>,
        saved: Vec<CellWrite>,
    },
    /// A batch of cell overwrites
    ModifiedValues { writes: Vec<CellWrite> },
    /// Visible-field lists replaced on one or more collections
    ModifiedVisibilities { changes: Vec<VisibilityChange> },
}

impl HistoryEntry {
    /// Stable name of the entry kind, for logs and the status line
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEntry::AddScans { .. } => "add_scans",
            HistoryEntry::RemoveScans { .. } => "remove_scans",
            HistoryEntry::AddTag { .. } => "add_tag",
            HistoryEntry::RemoveTags { .. } => "remove_tags",
            HistoryEntry::ModifiedValues { .. } => "modified_values",
            HistoryEntry::ModifiedVisibilities { .. } => "modified_visibilities",
        }
    }

    /// Apply the inverse of this entry. Errors mean the database no longer
    /// matches the entry, which a correctly sequenced log never produces.
    fn undo_on(&self, db: &mut Database) -> Result<()> {
        match self {
            HistoryEntry::AddScans { current, initial } => {
                for doc in current {
                    db.remove_document(COLLECTION_CURRENT, &doc.key)?;
                }
                for doc in initial {
                    db.remove_document(COLLECTION_INITIAL, &doc.key)?;
                }
            }
            HistoryEntry::RemoveScans { current, initial } => {
                for doc in current {
                    db.add_document(COLLECTION_CURRENT, doc.clone())?;
                }
                for doc in initial {
                    db.add_document(COLLECTION_INITIAL, doc.clone())?;
                }
            }
            HistoryEntry::AddTag { specs, .. } => {
                // Dropping the field drops its cells with it
                for spec in specs {
                    db.remove_field(&spec.collection, &spec.name)?;
                }
            }
            HistoryEntry::RemoveTags { specs, saved } => {
                db.add_fields(specs)?;
                for write in saved {
                    db.set_value(&write.collection, &write.key, &write.field, write.old.clone())?;
                }
            }
            HistoryEntry::ModifiedValues { writes } => {
                for write in writes.iter().rev() {
                    db.set_value(&write.collection, &write.key, &write.field, write.old.clone())?;
                }
            }
            HistoryEntry::ModifiedVisibilities { changes } => {
                for change in changes {
                    db.set_visibles(&change.collection, &change.before)?;
                }
            }
        }
        Ok(())
    }

    /// Apply this entry forward again after an undo
    fn redo_on(&self, db: &mut Database) -> Result<()> {
        match self {
            HistoryEntry::AddScans { current, initial } => {
                for doc in current {
                    db.add_document(COLLECTION_CURRENT, doc.clone())?;
                }
                for doc in initial {
                    db.add_document(COLLECTION_INITIAL, doc.clone())?;
                }
            }
            HistoryEntry::RemoveScans { current, initial } => {
                for doc in current {
                    db.remove_document(COLLECTION_CURRENT, &doc.key)?;
                }
                for doc in initial {
                    db.remove_document(COLLECTION_INITIAL, &doc.key)?;
                }
            }
            HistoryEntry::AddTag { specs, writes } => {
                db.add_fields(specs)?;
                for write in writes {
                    db.set_value(&write.collection, &write.key, &write.field, write.new.clone())?;
                }
            }
            HistoryEntry::RemoveTags { specs, .. } => {
                for spec in specs {
                    db.remove_field(&spec.collection, &spec.name)?;
                }
            }
            HistoryEntry::ModifiedValues { writes } => {
                for write in writes {
                    db.set_value(&write.collection, &write.key, &write.field, write.new.clone())?;
                }
            }
            HistoryEntry::ModifiedVisibilities { changes } => {
                for change in changes {
                    db.set_visibles(&change.collection, &change.after)?;
                }
            }
        }
        Ok(())
    }
}

// ==========================================================================
// The log
// ==========================================================================

/// Two-stack undo/redo log, owned by a project and never persisted
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed mutation. Clears the redo stack: entries taken
    /// back by `undo` die the moment a new mutation lands.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Take back the most recent mutation and move its entry to the redo
    /// stack. Returns the kind that was undone. If the replay itself fails
    /// the entry is discarded rather than left on either stack.
    pub fn undo(&mut self, db: &mut Database) -> Result<&'static str> {
        let entry = self.undo.pop().ok_or(Error::NothingToUndo)?;
        entry.undo_on(db)?;
        let kind = entry.kind();
        self.redo.push(entry);
        Ok(kind)
    }

    /// Re-apply the most recently undone mutation and move its entry back
    /// to the undo stack. Returns the kind that was redone.
    pub fn redo(&mut self, db: &mut Database) -> Result<&'static str> {
        let entry = self.redo.pop().ok_or(Error::NothingToRedo)?;
        entry.redo_on(db)?;
        let kind = entry.kind();
        self.undo.push(entry);
        Ok(kind)
    }

    /// Drop both stacks
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::TAG_FILENAME;
    use crate::schema::{FieldDef, FieldType};

    fn scan_db() -> Database {
        let mut db = Database::new();
        db.add_collection(COLLECTION_CURRENT, TAG_FILENAME).unwrap();
        db.add_collection(COLLECTION_INITIAL, TAG_FILENAME).unwrap();
        db
    }

    fn spec(collection: &str, name: &str, field_type: FieldType) -> FieldSpec {
        FieldSpec {
            collection: collection.to_string(),
            name: name.to_string(),
            def: FieldDef {
                field_type,
                ..Default::default()
            },
        }
    }

    fn noop_entry() -> HistoryEntry {
        HistoryEntry::ModifiedValues { writes: vec![] }
    }

    #[test]
    fn test_record_clears_redo() {
        let mut db = scan_db();
        let mut history = History::new();
        history.record(noop_entry());
        history.record(noop_entry());

        history.undo(&mut db).unwrap();
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 1);

        history.record(noop_entry());
        assert_eq!(history.undo_depth(), 2);
        assert_eq!(history.redo_depth(), 0);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_empty_stacks_report_nothing_to_do() {
        let mut db = scan_db();
        let mut history = History::new();
        assert!(matches!(history.undo(&mut db), Err(Error::NothingToUndo)));
        assert!(matches!(history.redo(&mut db), Err(Error::NothingToRedo)));
    }

    #[test]
    fn test_modified_values_round_trip() {
        let mut db = scan_db();
        db.add_fields(&[spec(COLLECTION_CURRENT, "Grade", FieldType::Int)])
            .unwrap();
        db.add_document(COLLECTION_CURRENT, Document::new("scan_1"))
            .unwrap();
        let old = db
            .set_value(COLLECTION_CURRENT, "scan_1", "Grade", Value::Int(3))
            .unwrap();
        assert_eq!(old, Value::Null);

        let mut history = History::new();
        history.record(HistoryEntry::ModifiedValues {
            writes: vec![CellWrite {
                collection: COLLECTION_CURRENT.to_string(),
                key: "scan_1".to_string(),
                field: "Grade".to_string(),
                old: Value::Null,
                new: Value::Int(3),
            }],
        });

        assert_eq!(history.undo(&mut db).unwrap(), "modified_values");
        assert_eq!(
            db.get_value(COLLECTION_CURRENT, "scan_1", "Grade").unwrap(),
            Value::Null
        );

        assert_eq!(history.redo(&mut db).unwrap(), "modified_values");
        assert_eq!(
            db.get_value(COLLECTION_CURRENT, "scan_1", "Grade").unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_add_tag_round_trip() {
        let mut db = scan_db();
        db.add_document(COLLECTION_CURRENT, Document::new("scan_1"))
            .unwrap();
        db.add_document(COLLECTION_INITIAL, Document::new("scan_1"))
            .unwrap();

        let specs = vec![
            spec(COLLECTION_CURRENT, "Comment", FieldType::String),
            spec(COLLECTION_INITIAL, "Comment", FieldType::String),
        ];
        db.add_fields(&specs).unwrap();
        db.set_value(
            COLLECTION_CURRENT,
            "scan_1",
            "Comment",
            Value::String("good".into()),
        )
        .unwrap();

        let mut history = History::new();
        history.record(HistoryEntry::AddTag {
            specs,
            writes: vec![CellWrite {
                collection: COLLECTION_CURRENT.to_string(),
                key: "scan_1".to_string(),
                field: "Comment".to_string(),
                old: Value::Null,
                new: Value::String("good".into()),
            }],
        });

        history.undo(&mut db).unwrap();
        assert!(db.get_field(COLLECTION_CURRENT, "Comment").unwrap().is_none());
        assert!(db.get_field(COLLECTION_INITIAL, "Comment").unwrap().is_none());

        history.redo(&mut db).unwrap();
        assert_eq!(
            db.get_value(COLLECTION_CURRENT, "scan_1", "Comment").unwrap(),
            Value::String("good".into())
        );
        assert_eq!(
            db.get_value(COLLECTION_INITIAL, "scan_1", "Comment").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_remove_tags_undo_restores_cells() {
        let mut db = scan_db();
        db.add_document(COLLECTION_CURRENT, Document::new("scan_1"))
            .unwrap();
        let specs = vec![spec(COLLECTION_CURRENT, "Grade", FieldType::Int)];
        db.add_fields(&specs).unwrap();
        db.set_value(COLLECTION_CURRENT, "scan_1", "Grade", Value::Int(5))
            .unwrap();

        let (_, cells) = db.remove_field(COLLECTION_CURRENT, "Grade").unwrap();
        let saved: Vec<CellWrite> = cells
            .into_iter()
            .map(|(key, old)| CellWrite {
                collection: COLLECTION_CURRENT.to_string(),
                key,
                field: "Grade".to_string(),
                old,
                new: Value::Null,
            })
            .collect();

        let mut history = History::new();
        history.record(HistoryEntry::RemoveTags { specs, saved });

        history.undo(&mut db).unwrap();
        assert_eq!(
            db.get_value(COLLECTION_CURRENT, "scan_1", "Grade").unwrap(),
            Value::Int(5)
        );

        history.redo(&mut db).unwrap();
        assert!(db.get_field(COLLECTION_CURRENT, "Grade").unwrap().is_none());
    }

    #[test]
    fn test_scans_round_trip_touches_both_collections() {
        let mut db = scan_db();
        let mut doc = Document::new("scan_1");
        doc.set("Type", Value::String("Scan".into()));
        // Type must exist before the snapshot can be re-added
        db.add_fields(&[
            spec(COLLECTION_CURRENT, "Type", FieldType::String),
            spec(COLLECTION_INITIAL, "Type", FieldType::String),
        ])
        .unwrap();
        db.add_document(COLLECTION_CURRENT, doc.clone()).unwrap();
        db.add_document(COLLECTION_INITIAL, doc.clone()).unwrap();

        let mut history = History::new();
        history.record(HistoryEntry::AddScans {
            current: vec![doc.clone()],
            initial: vec![doc],
        });

        history.undo(&mut db).unwrap();
        assert_eq!(db.document_count(COLLECTION_CURRENT).unwrap(), 0);
        assert_eq!(db.document_count(COLLECTION_INITIAL).unwrap(), 0);

        history.redo(&mut db).unwrap();
        assert!(db.has_document(COLLECTION_CURRENT, "scan_1").unwrap());
        assert!(db.has_document(COLLECTION_INITIAL, "scan_1").unwrap());
    }

    #[test]
    fn test_visibilities_round_trip() {
        let mut db = scan_db();
        db.add_fields(&[
            spec(COLLECTION_CURRENT, "A", FieldType::String),
            spec(COLLECTION_CURRENT, "B", FieldType::String),
        ])
        .unwrap();
        let before = db.get_visibles(COLLECTION_CURRENT).unwrap();
        let after = vec!["B".to_string()];
        db.set_visibles(COLLECTION_CURRENT, &after).unwrap();

        let mut history = History::new();
        history.record(HistoryEntry::ModifiedVisibilities {
            changes: vec![VisibilityChange {
                collection: COLLECTION_CURRENT.to_string(),
                before: before.clone(),
                after: after.clone(),
            }],
        });

        history.undo(&mut db).unwrap();
        assert_eq!(db.get_visibles(COLLECTION_CURRENT).unwrap(), before);

        history.redo(&mut db).unwrap();
        assert_eq!(db.get_visibles(COLLECTION_CURRENT).unwrap(), after);
    }
}
