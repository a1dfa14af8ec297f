//! Brick lifecycle
//!
//! A brick is one document in the `brick` collection describing a pipeline
//! step: name, init/exec status and timestamps, and the resolved input and
//! output maps. Scan documents point back at the bricks that produced them
//! through their hidden `Bricks` list.
//!
//! Before a step runs, stale candidates for its output paths are cleaned
//! up: among the not-yet-executed prior bricks the most recently created
//! one is kept (a re-run reuses it), all earlier ones are deleted and
//! detached from every back-reference in both scan collections. A brick
//! that reached `Exec = "Done"` is never touched again; a re-run of the
//! same path goes through a fresh candidate instead.

use std::collections::HashSet;

use tracing::info;

use crate::error::{Error, Result};
use crate::project::{
    now_micros, Project, BRICK_EXEC, BRICK_EXEC_TIME, BRICK_INIT, BRICK_INIT_TIME, BRICK_INPUTS,
    BRICK_NAME, BRICK_OUTPUTS, COLLECTION_BRICK, COLLECTION_CURRENT, COLLECTION_INITIAL,
    STATUS_DONE, STATUS_NOT_DONE, TAG_BRICKS,
};
use crate::storage::document::{Document, Value};

/// A processing step about to run, with its resolved output paths
/// (current-collection primary keys)
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub inputs: serde_json::Value,
    pub outputs: Vec<String>,
}

impl Project {
    /// Hook called before a processing step runs. Cleans up stale bricks
    /// for the step's output paths, then initializes the brick for this
    /// run (reusing the retained candidate when one survives) and returns
    /// its id.
    pub fn on_process_about_to_run(&mut self, spec: &ProcessSpec) -> Result<String> {
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for output in &spec.outputs {
            if !self.database.has_document(COLLECTION_CURRENT, output)? {
                continue;
            }
            let Value::List(items) =
                self.database
                    .get_value(COLLECTION_CURRENT, output, TAG_BRICKS)?
            else {
                continue;
            };
            for item in items {
                let Some(id) = item.as_str() else { continue };
                if !seen.insert(id.to_string()) {
                    continue;
                }
                if !self.database.has_document(COLLECTION_BRICK, id)? {
                    continue;
                }
                let exec = self.database.get_value(COLLECTION_BRICK, id, BRICK_EXEC)?;
                if exec != Value::String(STATUS_DONE.to_string()) {
                    candidates.push(id.to_string());
                }
            }
        }

        // Creation order is the brick collection's insertion order; the
        // last not-executed candidate survives, the rest are stale retries.
        let order = self.database.get_documents_names(COLLECTION_BRICK)?;
        candidates.sort_by_key(|id| order.iter().position(|o| o == id).unwrap_or(0));
        let retained = candidates.pop();
        for stale in &candidates {
            self.database.remove_document(COLLECTION_BRICK, stale)?;
            self.detach_brick_references(stale)?;
            info!(brick = %stale, "discarded stale brick");
        }

        let brick_id = match retained {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.database
                    .add_document(COLLECTION_BRICK, Document::new(id.clone()))?;
                id
            }
        };
        self.write_brick_init(&brick_id, spec)?;
        for output in &spec.outputs {
            self.attach_brick_reference(output, &brick_id)?;
        }
        info!(brick = %brick_id, name = %spec.name, "brick initialized");
        Ok(brick_id)
    }

    /// Hook called after a processing step completes: the brick's
    /// execution status flips to done with a completion timestamp
    pub fn on_process_finished(&mut self, brick_id: &str) -> Result<()> {
        if !self.database.has_document(COLLECTION_BRICK, brick_id)? {
            return Err(Error::DocumentNotFound {
                collection: COLLECTION_BRICK.to_string(),
                key: brick_id.to_string(),
            });
        }
        self.database.set_value(
            COLLECTION_BRICK,
            brick_id,
            BRICK_EXEC,
            Value::String(STATUS_DONE.to_string()),
        )?;
        self.database.set_value(
            COLLECTION_BRICK,
            brick_id,
            BRICK_EXEC_TIME,
            Value::DateTime(now_micros()),
        )?;
        info!(brick = %brick_id, "brick executed");
        Ok(())
    }

    /// Fresh init state for a run: name, `Init = "Done"` with a new
    /// timestamp, `Exec = "Not Done"` with the completion time cleared,
    /// and the resolved input/output maps
    fn write_brick_init(&mut self, id: &str, spec: &ProcessSpec) -> Result<()> {
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_NAME,
            Value::String(spec.name.clone()),
        )?;
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_INIT,
            Value::String(STATUS_DONE.to_string()),
        )?;
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_INIT_TIME,
            Value::DateTime(now_micros()),
        )?;
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_EXEC,
            Value::String(STATUS_NOT_DONE.to_string()),
        )?;
        self.database
            .set_value(COLLECTION_BRICK, id, BRICK_EXEC_TIME, Value::Null)?;
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_INPUTS,
            Value::Json(spec.inputs.clone()),
        )?;
        self.database.set_value(
            COLLECTION_BRICK,
            id,
            BRICK_OUTPUTS,
            Value::Json(serde_json::Value::from(spec.outputs.clone())),
        )?;
        Ok(())
    }

    /// Remove a brick id from every document's back-reference list in both
    /// scan collections
    fn detach_brick_references(&mut self, brick_id: &str) -> Result<()> {
        for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
            for key in self.database.get_documents_names(collection)? {
                let Value::List(items) = self.database.get_value(collection, &key, TAG_BRICKS)?
                else {
                    continue;
                };
                if items.iter().any(|item| item.as_str() == Some(brick_id)) {
                    let pruned: Vec<Value> = items
                        .into_iter()
                        .filter(|item| item.as_str() != Some(brick_id))
                        .collect();
                    self.database
                        .set_value(collection, &key, TAG_BRICKS, Value::List(pruned))?;
                }
            }
        }
        Ok(())
    }

    /// Append a brick id to one scan's back-reference list in both scan
    /// collections, skipping sides that do not hold the document
    fn attach_brick_reference(&mut self, key: &str, brick_id: &str) -> Result<()> {
        for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
            if !self.database.has_document(collection, key)? {
                continue;
            }
            let mut items = match self.database.get_value(collection, key, TAG_BRICKS)? {
                Value::List(items) => items,
                _ => Vec::new(),
            };
            if !items.iter().any(|item| item.as_str() == Some(brick_id)) {
                items.push(Value::String(brick_id.to_string()));
                self.database
                    .set_value(collection, key, TAG_BRICKS, Value::List(items))?;
            }
        }
        Ok(())
    }
}

// ==========================================================================
// Tests
// ==========================================================================
