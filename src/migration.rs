//! Forward migration of store file formats.
//!
//! A context loaded from an older file format version is upgraded in place
//! through ordered, cumulative steps until it reaches
//! [`FILE_FORMAT_VERSION`]. A context from a future version has no migration
//! path and is rejected without partial work.

use crate::error::{Result, StoreError};
use crate::types::{ObjectData, StoreFileContext};
use tracing::debug;

/// Current file format version written by this engine.
pub const FILE_FORMAT_VERSION: u32 = 3;

/// Engine version string stamped into `meta.ver`.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upgrade a context to the current file format version.
///
/// Returns `true` when the context changed, so the caller can treat the
/// repair as a mutation and persist the upgraded shape. Re-running on an
/// already-current context only refreshes a stale `meta.ver` string.
pub fn migrate_context<D>(context: &mut StoreFileContext<D>) -> Result<bool> {
    if context.meta.fv > FILE_FORMAT_VERSION {
        return Err(StoreError::VersionIncompatible {
            meta: Box::new(context.meta.clone()),
            supported: FILE_FORMAT_VERSION,
        });
    }

    let mut changed = false;

    if context.meta.fv < FILE_FORMAT_VERSION {
        debug!(
            id = %context.meta.id,
            fv = context.meta.fv,
            "migrating store file context"
        );
    }

    if context.meta.fv == 1 {
        migrate_v1_to_v2(context);
        changed = true;
    }

    if context.meta.fv == 2 {
        migrate_v2_to_v3(context);
        changed = true;
    }

    // The engine version string tracks whichever engine wrote the file last,
    // independent of the format version.
    if context.meta.ver != ENGINE_VERSION {
        context.meta.ver = ENGINE_VERSION.to_string();
        changed = true;
    }

    Ok(changed)
}

/// v1 -> v2: the schema version field did not exist yet; default it to 0.
fn migrate_v1_to_v2<D>(context: &mut StoreFileContext<D>) {
    if context.meta.schema_ver.is_none() {
        context.meta.schema_ver = Some(0);
    }
    context.meta.fv = 2;
}

/// v2 -> v3: schema versions start at 1, the engine version string moved
/// from the context top level into the metadata, and `extra` is always
/// present.
fn migrate_v2_to_v3<D>(context: &mut StoreFileContext<D>) {
    if matches!(context.meta.schema_ver, None | Some(0)) {
        context.meta.schema_ver = Some(1);
    }
    context.legacy_ver = None;
    if context.meta.extra.is_none() {
        context.meta.extra = Some(ObjectData::new());
    }
    context.meta.fv = 3;
}
