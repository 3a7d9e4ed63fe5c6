//! Core types for the reference layer.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// JSON-object payload owned by a reference.
pub type ObjectData = serde_json::Map<String, serde_json::Value>;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_millis() as u64)
    }

    /// True for the zero placeholder stamped on fresh collection items.
    pub fn unset(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Discriminates the two store file shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFileType {
    Document,
    Collection,
}

/// Access-scope classification of a store file, set at creation.
///
/// The reference layer only carries the tag; enforcement is the owning
/// store's job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Public,
    Authenticated,
    PerUser,
    PerToken,
    PerDevice,
}

/// On-disk payload encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFileExtension {
    Json,
}

impl Default for StoreFileExtension {
    fn default() -> Self {
        StoreFileExtension::Json
    }
}

/// Metadata of one store file (document or collection).
///
/// Field names serialize in the on-disk camelCase shape and must round-trip
/// through the owning store's encoding unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFileMeta {
    /// Stable identifier, immutable after creation.
    pub id: String,

    /// Access scope, immutable after creation.
    pub region: Region,

    /// Monotonic mutation counter.
    pub rev: u64,

    /// Set once at construction.
    pub created: Timestamp,

    /// Refreshed on every accepted mutation; never behind `created`.
    pub updated: Timestamp,

    /// Document or collection; mismatch is a construction-time error.
    #[serde(rename = "type")]
    pub file_type: StoreFileType,

    /// On-disk payload encoding.
    #[serde(default)]
    pub extension: StoreFileExtension,

    /// File format version; drives migration.
    pub fv: u32,

    /// Engine version string that last wrote this file.
    pub ver: String,

    /// Caller-controlled logical schema version of the payload.
    /// Absent only in pre-fv2 files; migration fills it in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_ver: Option<u64>,

    /// Open bag of caller-defined metadata fields.
    /// Guaranteed present from fv3 on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<ObjectData>,

    /// Flush delay in milliseconds; absent means next-tick flush.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_debounce: Option<u64>,
}

/// In-memory `{ok, meta, data}` triple exclusively owned by one reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreFileContext<D> {
    /// Valid-load marker; `false` flags a corrupt or partial load.
    /// Defaults to `false` so a truncated file never parses as valid.
    #[serde(default)]
    pub ok: bool,

    pub meta: StoreFileMeta,

    pub data: D,

    /// Legacy top-level engine version written by pre-fv3 files.
    /// Kept only so migration can strip it.
    #[serde(default, rename = "ver", skip_serializing_if = "Option::is_none")]
    pub legacy_ver: Option<String>,
}

impl<D: serde::de::DeserializeOwned> StoreFileContext<D> {
    /// Parse a raw store-file value loaded by the owning store.
    ///
    /// Shape problems surface as typed errors so the store can distinguish
    /// a missing metadata block from a payload that fails to parse.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value.get("meta") {
            None | Some(serde_json::Value::Null) => return Err(StoreError::MetaMissing),
            Some(_) => {}
        }
        serde_json::from_value(value).map_err(StoreError::from)
    }
}

/// Per-item metadata inside a collection.
///
/// Same revision/timestamp semantics as [`StoreFileMeta`], but the counters
/// are independent from the collection-level ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionItemMeta {
    pub id: String,
    pub rev: u64,
    pub created: Timestamp,
    pub updated: Timestamp,
}

/// One collection entry: its metadata and JSON-object data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub meta: CollectionItemMeta,
    pub data: ObjectData,
}

/// Context of a single document store file.
pub type DocumentContext = StoreFileContext<ObjectData>;

/// Context of a collection store file. Item ids are unique keys; insertion
/// order carries no meaning.
pub type CollectionContext = StoreFileContext<HashMap<String, CollectionItem>>;
