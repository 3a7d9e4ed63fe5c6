//! # refstore
//!
//! Reference layer for JSON document stores. A reference owns one in-memory
//! store file context, tracks per-record revisions and timestamps, coalesces
//! rapid mutations into a single flush notice for the owning store, and
//! migrates older on-disk metadata formats forward.
//!
//! ## Core Concepts
//!
//! - **Contexts**: The `{ok, meta, data}` triple a reference exclusively owns
//! - **Documents**: One JSON-object payload with debounced flush coalescing
//! - **Collections**: Per-item CRUD with synchronous flush notices
//! - **Migration**: Ordered, idempotent upgrades of older file formats
//! - **Flush signals**: Subscribable notices telling the owning store when
//!   to persist
//!
//! ## Example
//!
//! ```ignore
//! use refstore::{CollectionReference, DocumentReference, ObjectData, Region};
//!
//! // The owning store builds a fresh context and wraps it in a reference.
//! let context = DocumentReference::new_context("profile", Region::PerUser, ObjectData::new());
//! let doc = DocumentReference::new(context)?;
//! let signal = doc.subscribe();
//!
//! // Mutations coalesce; the store receives one notice per flush window.
//! doc.merge_data(serde_json::json!({"name": "alice"}).as_object().cloned().unwrap());
//! doc.save_immediate();
//!
//! let notice = signal.recv()?;
//! persist(notice.id, doc.get_full_context());
//! doc.acknowledge_persisted();
//! ```
//!
//! The actual file-system persistence engine, TTL policy, and logger setup
//! live in the owning store, not here.

pub mod collection;
pub mod document;
pub mod error;
pub mod migration;
mod scheduler;
pub mod signal;
pub mod types;

// Re-exports
pub use collection::CollectionReference;
pub use document::DocumentReference;
pub use error::{Result, StoreError};
pub use migration::{migrate_context, ENGINE_VERSION, FILE_FORMAT_VERSION};
pub use signal::{FlushNotice, FlushSignal};
pub use types::*;
