//! Document reference: owns one JSON-object store file.

use crate::error::{Result, StoreError};
use crate::migration::{self, ENGINE_VERSION, FILE_FORMAT_VERSION};
use crate::scheduler::{flush_wait, FlushScheduler};
use crate::signal::{FlushNotice, FlushSignal, Notifier};
use crate::types::{
    DocumentContext, ObjectData, Region, StoreFileExtension, StoreFileMeta, StoreFileType,
    Timestamp,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Inner state shared with the deferred flush task.
struct DocumentInner {
    context: DocumentContext,
    scheduler: FlushScheduler,
    frozen: bool,
}

impl DocumentInner {
    /// Revision bookkeeping for a resolved flush.
    fn refresh_meta(&mut self) {
        self.context.meta.rev += 1;
        self.context.meta.updated = Timestamp::now();
    }
}

/// Reference to a single document store file.
///
/// The reference owns the in-memory context; loading and saving bytes is the
/// owning store's job. Mutations are synchronous and coalesce into at most
/// one flush notice per debounce window (configured by
/// `meta.changeDebounce`, next-tick when absent). The deferred flush runs on
/// a Tokio task, so mutating methods must be called within a runtime.
pub struct DocumentReference {
    id: String,
    inner: Arc<Mutex<DocumentInner>>,
    notifier: Arc<Notifier>,
}

impl DocumentReference {
    /// Build a fresh document context on the current file format.
    pub fn new_context(id: impl Into<String>, region: Region, data: ObjectData) -> DocumentContext {
        let id = id.into();
        debug!(id = %id, "new document context");
        let now = Timestamp::now();
        DocumentContext {
            ok: true,
            meta: StoreFileMeta {
                id,
                region,
                rev: 1,
                created: now,
                updated: now,
                file_type: StoreFileType::Document,
                extension: StoreFileExtension::Json,
                fv: FILE_FORMAT_VERSION,
                ver: ENGINE_VERSION.to_string(),
                schema_ver: Some(1),
                extra: Some(ObjectData::new()),
                change_debounce: None,
            },
            data,
            legacy_ver: None,
        }
    }

    /// Validate a loaded context and wrap it in a reference.
    ///
    /// A context on an older file format is migrated in place and the
    /// repaired shape is scheduled for persistence; a context from a future
    /// format version is rejected. Must be called within a Tokio runtime.
    pub fn new(mut context: DocumentContext) -> Result<Self> {
        if !context.ok {
            return Err(StoreError::ContextNotOk {
                meta: Box::new(context.meta),
            });
        }
        if context.meta.file_type != StoreFileType::Document {
            return Err(StoreError::TypeMismatch {
                expected: StoreFileType::Document,
                found: context.meta.file_type,
                meta: Box::new(context.meta),
            });
        }

        let repaired = migration::migrate_context(&mut context)?;

        let id = context.meta.id.clone();
        debug!(id = %id, rev = context.meta.rev, "new document reference");

        let debounce = context.meta.change_debounce.map(Duration::from_millis);
        let reference = Self {
            id,
            inner: Arc::new(Mutex::new(DocumentInner {
                context,
                scheduler: FlushScheduler::new(debounce),
                frozen: false,
            })),
            notifier: Arc::new(Notifier::new()),
        };

        if repaired {
            // The migrated shape must reach disk without waiting for a
            // caller mutation.
            reference.schedule_flush(false);
        }

        Ok(reference)
    }

    /// Subscribe to flush notices for this document.
    ///
    /// Changes made before the subscription (a construction-time migration,
    /// for example) are visible through [`has_unsaved_changes`].
    ///
    /// [`has_unsaved_changes`]: DocumentReference::has_unsaved_changes
    pub fn subscribe(&self) -> FlushSignal {
        self.notifier.subscribe()
    }

    /// Document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Document data.
    pub fn get_data(&self) -> ObjectData {
        trace!(id = %self.id, "get_data");
        self.inner.lock().context.data.clone()
    }

    /// Store file metadata.
    pub fn get_store_meta(&self) -> StoreFileMeta {
        trace!(id = %self.id, "get_store_meta");
        self.inner.lock().context.meta.clone()
    }

    /// Replace the whole payload.
    pub fn replace_data(&self, data: ObjectData) {
        trace!(id = %self.id, "replace_data");
        self.inner.lock().context.data = data;
        self.schedule_flush(false);
    }

    /// Shallow-merge fields into the payload.
    pub fn merge_data(&self, partial: ObjectData) {
        trace!(id = %self.id, "merge_data");
        {
            let mut inner = self.inner.lock();
            for (key, value) in partial {
                inner.context.data.insert(key, value);
            }
        }
        self.schedule_flush(false);
    }

    /// Ask the owner to persist current state on the next flush window.
    pub fn save(&self) {
        trace!(id = %self.id, "save");
        self.schedule_flush(false);
    }

    /// Ask the owner to persist now, bypassing the debounce window.
    ///
    /// A pending delayed flush is converted into this immediate one.
    pub fn save_immediate(&self) {
        trace!(id = %self.id, "save_immediate");
        self.schedule_flush(true);
    }

    /// Logical schema version of the payload.
    pub fn schema_ver(&self) -> u64 {
        self.inner.lock().context.meta.schema_ver.unwrap_or(0)
    }

    /// Set the logical schema version of the payload.
    pub fn set_schema_ver(&self, version: u64) {
        debug!(id = %self.id, version, "set_schema_ver");
        self.inner.lock().context.meta.schema_ver = Some(version);
        self.schedule_flush(false);
    }

    /// Whether flush notices are currently withheld.
    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    /// Freeze or unfreeze flush notices.
    ///
    /// Takes effect synchronously and triggers no notify of its own. While
    /// frozen, due flushes still refresh revision bookkeeping but the owner
    /// is not notified.
    pub fn set_frozen(&self, frozen: bool) {
        debug!(id = %self.id, frozen, "set_frozen");
        self.inner.lock().frozen = frozen;
    }

    /// Extra metadata bag.
    pub fn get_extra_meta(&self) -> ObjectData {
        trace!(id = %self.id, "get_extra_meta");
        self.inner.lock().context.meta.extra.clone().unwrap_or_default()
    }

    /// Replace the extra metadata bag.
    pub fn replace_extra_meta(&self, extra: ObjectData) {
        trace!(id = %self.id, "replace_extra_meta");
        self.inner.lock().context.meta.extra = Some(extra);
        self.schedule_flush(false);
    }

    /// Shallow-merge fields into the extra metadata bag.
    pub fn merge_extra_meta(&self, partial: ObjectData) {
        trace!(id = %self.id, "merge_extra_meta");
        {
            let mut inner = self.inner.lock();
            let extra = inner.context.meta.extra.get_or_insert_with(ObjectData::new);
            for (key, value) in partial {
                extra.insert(key, value);
            }
        }
        self.schedule_flush(false);
    }

    /// Full context snapshot for the owning store to serialize.
    pub fn get_full_context(&self) -> DocumentContext {
        trace!(id = %self.id, "get_full_context");
        self.inner.lock().context.clone()
    }

    /// Whether some mutation has not been acknowledged as persisted.
    ///
    /// The flag is sticky: the reference never clears it on its own. The
    /// owning store calls [`acknowledge_persisted`] once bytes hit storage.
    ///
    /// [`acknowledge_persisted`]: DocumentReference::acknowledge_persisted
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.lock().scheduler.is_dirty()
    }

    /// Owner acknowledgement that the last flush reached storage.
    pub fn acknowledge_persisted(&self) {
        trace!(id = %self.id, "acknowledge_persisted");
        self.inner.lock().scheduler.acknowledge_persisted();
    }

    /// Claim and run one coalesced flush cycle.
    fn schedule_flush(&self, immediate: bool) {
        let wait = {
            let mut inner = self.inner.lock();
            if !inner.scheduler.begin(immediate) {
                trace!(id = %self.id, "flush already pending, coalesced");
                return;
            }
            inner.scheduler.wait(immediate)
        };

        let id = self.id.clone();
        let inner = Arc::clone(&self.inner);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            flush_wait(wait).await;

            let mut inner = inner.lock();
            if !inner.scheduler.commit() {
                // A faster flush resolved while this one was waiting.
                trace!(id = %id, "flush superseded");
                return;
            }

            inner.refresh_meta();
            let rev = inner.context.meta.rev;

            if inner.frozen {
                debug!(id = %id, rev, "flush suppressed while frozen");
                return;
            }

            trace!(id = %id, rev, "flush due");
            notifier.emit(FlushNotice {
                id,
                rev,
                kind: StoreFileType::Document,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> ObjectData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_context_shape() {
        let context =
            DocumentReference::new_context("profile", Region::PerUser, ObjectData::new());

        assert!(context.ok);
        assert_eq!(context.meta.rev, 1);
        assert_eq!(context.meta.fv, FILE_FORMAT_VERSION);
        assert_eq!(context.meta.file_type, StoreFileType::Document);
        assert_eq!(context.meta.schema_ver, Some(1));
        assert_eq!(context.meta.created, context.meta.updated);
        assert!(context.meta.extra.is_some());
    }

    #[tokio::test]
    async fn test_rejects_not_ok_context() {
        let mut context =
            DocumentReference::new_context("profile", Region::Public, ObjectData::new());
        context.ok = false;

        let result = DocumentReference::new(context);
        assert!(matches!(result, Err(StoreError::ContextNotOk { .. })));
    }

    #[tokio::test]
    async fn test_rejects_collection_context() {
        let mut context =
            DocumentReference::new_context("profile", Region::Public, ObjectData::new());
        context.meta.file_type = StoreFileType::Collection;

        let result = DocumentReference::new(context);
        assert!(matches!(
            result,
            Err(StoreError::TypeMismatch {
                expected: StoreFileType::Document,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reads_have_no_side_effects() {
        let context = DocumentReference::new_context(
            "profile",
            Region::Public,
            object(json!({"name": "alice"})),
        );
        let doc = DocumentReference::new(context).unwrap();

        let rev_before = doc.get_store_meta().rev;
        let _ = doc.get_data();
        let _ = doc.get_extra_meta();
        let _ = doc.get_full_context();
        assert_eq!(doc.get_store_meta().rev, rev_before);
        assert!(!doc.has_unsaved_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_is_shallow() {
        let context = DocumentReference::new_context(
            "profile",
            Region::Public,
            object(json!({"name": "alice", "age": 30})),
        );
        let doc = DocumentReference::new(context).unwrap();

        doc.merge_data(object(json!({"age": 31, "city": "berlin"})));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let data = doc.get_data();
        assert_eq!(data["name"], "alice");
        assert_eq!(data["age"], 31);
        assert_eq!(data["city"], "berlin");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_schema_ver_notifies() {
        let context =
            DocumentReference::new_context("profile", Region::Public, ObjectData::new());
        let doc = DocumentReference::new(context).unwrap();
        let signal = doc.subscribe();

        doc.set_schema_ver(2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(doc.schema_ver(), 2);
        let notice = signal.try_recv().unwrap();
        assert_eq!(notice.kind, StoreFileType::Document);
        assert_eq!(notice.rev, 2);
    }
}
