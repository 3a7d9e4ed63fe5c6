//! Collection reference: owns a mapping of item id to item context.

use crate::error::{Result, StoreError};
use crate::migration::{self, ENGINE_VERSION, FILE_FORMAT_VERSION};
use crate::scheduler::FlushScheduler;
use crate::signal::{FlushNotice, FlushSignal, Notifier};
use crate::types::{
    CollectionContext, CollectionItem, CollectionItemMeta, ObjectData, Region,
    StoreFileExtension, StoreFileMeta, StoreFileType, Timestamp,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Inner state behind the reference's mutex.
struct CollectionInner {
    context: CollectionContext,
    scheduler: FlushScheduler,
}

/// Reference to a collection store file.
///
/// Owns the item mapping plus collection-level metadata; loading and saving
/// bytes is the owning store's job. Collection flushes take the scheduler's
/// immediate path with no wait, so every operation resolves its own flush
/// synchronously and emits exactly one notice.
pub struct CollectionReference {
    id: String,
    inner: Mutex<CollectionInner>,
    notifier: Notifier,
}

impl CollectionReference {
    /// Build a fresh collection context on the current file format.
    pub fn new_context(id: impl Into<String>, region: Region) -> CollectionContext {
        let id = id.into();
        debug!(id = %id, "new collection context");
        let now = Timestamp::now();
        CollectionContext {
            ok: true,
            meta: StoreFileMeta {
                id,
                region,
                rev: 1,
                created: now,
                updated: now,
                file_type: StoreFileType::Collection,
                extension: StoreFileExtension::Json,
                fv: FILE_FORMAT_VERSION,
                ver: ENGINE_VERSION.to_string(),
                schema_ver: Some(1),
                extra: Some(ObjectData::new()),
                change_debounce: None,
            },
            data: HashMap::new(),
            legacy_ver: None,
        }
    }

    /// Validate a loaded context and wrap it in a reference.
    ///
    /// Same rules as documents: an older file format is migrated in place
    /// and the repair is flushed, a future format version is rejected.
    pub fn new(mut context: CollectionContext) -> Result<Self> {
        if !context.ok {
            return Err(StoreError::ContextNotOk {
                meta: Box::new(context.meta),
            });
        }
        if context.meta.file_type != StoreFileType::Collection {
            return Err(StoreError::TypeMismatch {
                expected: StoreFileType::Collection,
                found: context.meta.file_type,
                meta: Box::new(context.meta),
            });
        }

        let repaired = migration::migrate_context(&mut context)?;

        let id = context.meta.id.clone();
        debug!(id = %id, rev = context.meta.rev, "new collection reference");

        let reference = Self {
            id,
            inner: Mutex::new(CollectionInner {
                context,
                scheduler: FlushScheduler::new(None),
            }),
            notifier: Notifier::new(),
        };

        if repaired {
            let mut inner = reference.inner.lock();
            reference.notify(&mut inner, None);
        }

        Ok(reference)
    }

    /// Subscribe to flush notices for this collection.
    ///
    /// Changes made before the subscription (a construction-time migration,
    /// for example) are visible through [`has_unsaved_changes`].
    ///
    /// [`has_unsaved_changes`]: CollectionReference::has_unsaved_changes
    pub fn subscribe(&self) -> FlushSignal {
        self.notifier.subscribe()
    }

    /// Collection id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether an item exists in the collection.
    pub fn exists(&self, id: &str) -> bool {
        let exists = self.inner.lock().context.data.contains_key(id);
        trace!(id = %self.id, item = id, exists, "exists");
        exists
    }

    /// Collection-level metadata.
    pub fn stat(&self) -> StoreFileMeta {
        trace!(id = %self.id, "stat");
        self.inner.lock().context.meta.clone()
    }

    /// Number of items in the collection.
    pub fn len(&self) -> usize {
        self.inner.lock().context.data.len()
    }

    /// Whether the collection holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().context.data.is_empty()
    }

    /// Ids of all items, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().context.data.keys().cloned().collect()
    }

    /// An item's metadata.
    pub fn meta(&self, id: &str) -> Result<CollectionItemMeta> {
        trace!(id = %self.id, item = id, "meta");
        let inner = self.inner.lock();
        let item = Self::item(&inner, id)?;
        Ok(item.meta.clone())
    }

    /// An item's data.
    pub fn get(&self, id: &str) -> Result<ObjectData> {
        trace!(id = %self.id, item = id, "get");
        let inner = self.inner.lock();
        let item = Self::item(&inner, id)?;
        Ok(item.data.clone())
    }

    /// Create a new item.
    ///
    /// The item starts with `rev = 0` and zero timestamps; the flush that
    /// resolves within this call stamps them.
    pub fn create(&self, id: &str, data: ObjectData) -> Result<()> {
        debug!(id = %self.id, item = id, "create");
        let mut inner = self.inner.lock();
        if inner.context.data.contains_key(id) {
            return Err(StoreError::ItemExists(id.to_string()));
        }
        inner.context.data.insert(
            id.to_string(),
            CollectionItem {
                meta: CollectionItemMeta {
                    id: id.to_string(),
                    rev: 0,
                    created: Timestamp(0),
                    updated: Timestamp(0),
                },
                data,
            },
        );
        self.notify(&mut inner, Some(id));
        Ok(())
    }

    /// Delete an item. Deleting an absent id is a no-op that still bumps the
    /// collection-level revision.
    pub fn delete(&self, id: &str) {
        debug!(id = %self.id, item = id, "delete");
        let mut inner = self.inner.lock();
        inner.context.data.remove(id);
        self.notify(&mut inner, None);
    }

    /// Replace an existing item's data.
    pub fn set(&self, id: &str, data: ObjectData) -> Result<()> {
        debug!(id = %self.id, item = id, "set");
        let mut inner = self.inner.lock();
        let item = Self::item_mut(&mut inner, id)?;
        item.data = data;
        self.notify(&mut inner, Some(id));
        Ok(())
    }

    /// Shallow-merge fields into an existing item's data.
    pub fn update(&self, id: &str, partial: ObjectData) -> Result<()> {
        debug!(id = %self.id, item = id, "update");
        let mut inner = self.inner.lock();
        let item = Self::item_mut(&mut inner, id)?;
        for (key, value) in partial {
            item.data.insert(key, value);
        }
        self.notify(&mut inner, Some(id));
        Ok(())
    }

    /// Force a flush for an existing item without changing data.
    pub fn save(&self, id: &str) -> Result<()> {
        trace!(id = %self.id, item = id, "save");
        let mut inner = self.inner.lock();
        Self::item(&inner, id)?;
        self.notify(&mut inner, Some(id));
        Ok(())
    }

    /// Full context snapshot for the owning store to serialize.
    pub fn get_full_context(&self) -> CollectionContext {
        trace!(id = %self.id, "get_full_context");
        self.inner.lock().context.clone()
    }

    /// Whether some mutation has not been acknowledged as persisted.
    ///
    /// Sticky; cleared only by the owner via [`acknowledge_persisted`].
    ///
    /// [`acknowledge_persisted`]: CollectionReference::acknowledge_persisted
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.lock().scheduler.is_dirty()
    }

    /// Owner acknowledgement that the last flush reached storage.
    pub fn acknowledge_persisted(&self) {
        trace!(id = %self.id, "acknowledge_persisted");
        self.inner.lock().scheduler.acknowledge_persisted();
    }

    fn item<'a>(inner: &'a CollectionInner, id: &str) -> Result<&'a CollectionItem> {
        inner
            .context
            .data
            .get(id)
            .ok_or_else(|| StoreError::ItemNotFound(id.to_string()))
    }

    fn item_mut<'a>(inner: &'a mut CollectionInner, id: &str) -> Result<&'a mut CollectionItem> {
        inner
            .context
            .data
            .get_mut(id)
            .ok_or_else(|| StoreError::ItemNotFound(id.to_string()))
    }

    /// Resolve one flush inline: refresh metadata and emit the notice.
    ///
    /// The collection-level counters always advance; an item-targeted flush
    /// additionally advances that item's own counters.
    fn notify(&self, inner: &mut CollectionInner, item_id: Option<&str>) {
        inner.scheduler.begin(true);
        inner.scheduler.commit();

        let now = Timestamp::now();
        inner.context.meta.rev += 1;
        inner.context.meta.updated = now;

        if let Some(id) = item_id {
            if let Some(item) = inner.context.data.get_mut(id) {
                item.meta.rev += 1;
                item.meta.updated = now;
                if item.meta.created.unset() {
                    item.meta.created = now;
                }
            }
        }

        let rev = inner.context.meta.rev;
        trace!(id = %self.id, rev, "flush due");
        self.notifier.emit(FlushNotice {
            id: self.id.clone(),
            rev,
            kind: StoreFileType::Collection,
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

    fn posts() -> CollectionReference {
        CollectionReference::new(CollectionReference::new_context("posts", Region::Public))
            .unwrap()
    }

    #[test]
    fn test_new_context_shape() {
        let context = CollectionReference::new_context("posts", Region::Authenticated);

        assert!(context.ok);
        assert_eq!(context.meta.rev, 1);
        assert_eq!(context.meta.fv, FILE_FORMAT_VERSION);
        assert_eq!(context.meta.file_type, StoreFileType::Collection);
        assert!(context.data.is_empty());
    }

    #[test]
    fn test_rejects_document_context() {
        let mut context = CollectionReference::new_context("posts", Region::Public);
        context.meta.file_type = StoreFileType::Document;

        let result = CollectionReference::new(context);
        assert!(matches!(
            result,
            Err(StoreError::TypeMismatch {
                expected: StoreFileType::Collection,
                ..
            })
        ));
    }

    #[test]
    fn test_create_stamps_item_meta() {
        let posts = posts();
        posts.create("a", object(json!({"title": "x"}))).unwrap();

        let meta = posts.meta("a").unwrap();
        assert_eq!(meta.rev, 1);
        assert!(!meta.created.unset());
        assert_eq!(meta.created, meta.updated);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let posts = posts();
        posts.create("a", ObjectData::new()).unwrap();

        let result = posts.create("a", ObjectData::new());
        assert!(matches!(result, Err(StoreError::ItemExists(_))));
        // The rejected mutation must not advance any counter.
        assert_eq!(posts.stat().rev, 2);
    }

    #[test]
    fn test_item_and_collection_counters_are_independent() {
        let posts = posts();
        posts.create("a", ObjectData::new()).unwrap();
        posts.create("b", ObjectData::new()).unwrap();
        posts.set("a", object(json!({"title": "y"}))).unwrap();

        // Three flushes on the collection, two touching "a".
        assert_eq!(posts.stat().rev, 4);
        assert_eq!(posts.meta("a").unwrap().rev, 2);
        assert_eq!(posts.meta("b").unwrap().rev, 1);
    }

    #[test]
    fn test_delete_is_idempotent_and_bumps_collection_only() {
        let posts = posts();
        posts.create("a", ObjectData::new()).unwrap();
        let rev_after_create = posts.stat().rev;

        posts.delete("a");
        posts.delete("a");

        assert!(!posts.exists("a"));
        assert_eq!(posts.stat().rev, rev_after_create + 2);
    }

    #[test]
    fn test_save_requires_existing_item() {
        let posts = posts();
        assert!(matches!(
            posts.save("missing"),
            Err(StoreError::ItemNotFound(_))
        ));

        posts.create("a", ObjectData::new()).unwrap();
        let rev = posts.meta("a").unwrap().rev;
        posts.save("a").unwrap();
        assert_eq!(posts.meta("a").unwrap().rev, rev + 1);
    }

    #[test]
    fn test_every_operation_emits_one_notice() {
        let posts = posts();
        let signal = posts.subscribe();

        posts.create("a", object(json!({"title": "x"}))).unwrap();
        posts.update("a", object(json!({"title": "y"}))).unwrap();
        posts.delete("a");

        let mut notices = Vec::new();
        while let Ok(notice) = signal.try_recv() {
            notices.push(notice);
        }
        assert_eq!(notices.len(), 3);
        assert!(notices.iter().all(|n| n.id == "posts"));
        assert!(notices.iter().all(|n| n.kind == StoreFileType::Collection));
        assert_eq!(notices.last().unwrap().rev, 4);
    }

    #[test]
    fn test_ids_and_len() {
        let posts = posts();
        posts.create("a", ObjectData::new()).unwrap();
        posts.create("b", ObjectData::new()).unwrap();

        assert_eq!(posts.len(), 2);
        assert!(!posts.is_empty());
        let mut ids = posts.ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
