//! Scanbase - Scan Data Management
//!
//! A file-backed data management layer for imaging projects: typed documents
//! over YAML schemas and JSON rows, paired `current`/`initial` scan
//! collections with undo/redo, brick provenance for pipeline runs, and a
//! query layer compiled onto the ScanQL AST.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Scanbase Project                          │
//! │     (scans, tags, bricks, saved filters, import, history)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   ScanQL    │  │   Import    │  │   History               │  │
//! │  │   Compiler  │  │   Pipeline  │  │   (Undo / Redo Log)     │  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬─────────────┘  │
//! │         │                │                     │                │
//! │         ▼                ▼                     ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                   Database Facade                           ││
//! │  │  (collections, schema checks, cell reads/writes, filters)   ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                   Storage Layer                             ││
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  ││
//! │  │  │  Document   │  │  Collection │  │  Typed Value        │  ││
//! │  │  │  Store      │  │  Order      │  │  Codec              │  ││
//! │  │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  ││
//! │  └─────────┼────────────────┼────────────────────┼─────────────┘│
//! │            │                │                    │              │
//! │            ▼                ▼                    ▼              │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │           File System (YAML Schemas, JSON Rows)              ││
//! │  │  database/schemas/*.yaml        database/documents/*.json   ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod checksum;
pub mod database;
pub mod error;
pub mod history;
pub mod project;
pub mod query;
pub mod schema;
pub mod storage;

pub use scanql;

pub use database::Database;
pub use error::{Error, Result};
pub use history::{History, HistoryEntry};
pub use project::bricks::ProcessSpec;
pub use project::import::{ImportMilestone, ImportOptions, ImportReport};
pub use project::{Project, Properties, ValueWrite};
pub use schema::{CollectionDef, FieldDef, FieldOrigin, FieldType, Unit};
pub use storage::document::{Document, Value};
