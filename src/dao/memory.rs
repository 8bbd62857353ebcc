use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use crate::{
    dao::{
        StoreFuture,
        bumdes::BumdesStore,
        documents::{CHANGE_BUFFER, DocumentChange, DocumentStore, WritePlan},
        storage::{ImageStorage, PublicUrlLayout},
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        db::DocumentKey,
        models::{BumdesAddUpdateInputType, BumdesItem, StoredObject},
    },
};

/**
 * Process local document store. Used when no database is configured and in tests.
 */
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKey, Value>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        InMemoryDocumentStore { documents: RwLock::new(HashMap::new()), changes }
    }

    fn notify(&self, key: DocumentKey) {
        // No receivers is not an error
        drop(self.changes.send(DocumentChange::Written(key)));
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        InMemoryDocumentStore::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.documents.read().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a DocumentKey, body: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.documents.write().await.insert(key.clone(), body);
            self.notify(key.clone());
            Ok(())
        })
    }

    fn transact(&self, keys: Vec<DocumentKey>, plan: WritePlan) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let written: Vec<DocumentKey> = {
                let mut documents = self.documents.write().await;
                let current: Vec<Option<Value>> = keys.iter().map(|key| documents.get(key).cloned()).collect();
                let writes = plan(current)?;
                writes
                    .into_iter()
                    .map(|(key, body)| {
                        documents.insert(key.clone(), body);
                        key
                    })
                    .collect()
            };
            let count = written.len();
            written.into_iter().for_each(|key| self.notify(key));
            Ok(count)
        })
    }

    fn watch(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

struct BumdesTable {
    next_id: i64,
    rows: BTreeMap<i64, BumdesItem>,
}

/**
 * Process local BUMDes catalog.
 */
pub struct InMemoryBumdesStore {
    table: RwLock<BumdesTable>,
}

impl InMemoryBumdesStore {
    pub fn new() -> Self {
        InMemoryBumdesStore { table: RwLock::new(BumdesTable { next_id: 1, rows: BTreeMap::new() }) }
    }

    fn not_found() -> ApplicationError {
        ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string())
    }
}

impl Default for InMemoryBumdesStore {
    fn default() -> Self {
        InMemoryBumdesStore::new()
    }
}

impl BumdesStore for InMemoryBumdesStore {
    fn list(&self) -> StoreFuture<'_, Vec<BumdesItem>> {
        Box::pin(async move {
            let table = self.table.read().await;
            let mut items: Vec<BumdesItem> = table.rows.values().cloned().collect();
            items.sort_by(|left, right| right.created_at.cmp(&left.created_at).then(right.id.cmp(&left.id)));
            Ok(items)
        })
    }

    fn get(&self, id: i64) -> StoreFuture<'_, Option<BumdesItem>> {
        Box::pin(async move { Ok(self.table.read().await.rows.get(&id).cloned()) })
    }

    fn insert(&self, input: BumdesAddUpdateInputType, image: String) -> StoreFuture<'_, BumdesItem> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            let id = table.next_id;
            table.next_id += 1;
            let item = BumdesItem {
                id,
                title: input.title,
                description: input.description,
                content: input.content,
                image,
                category: input.category,
                status: input.status,
                established: input.established,
                manager: input.manager,
                revenue: input.revenue,
                employees: input.employees,
                location: input.location,
                created_at: Utc::now(),
                updated_at: None,
            };
            table.rows.insert(id, item.clone());
            Ok(item)
        })
    }

    fn update(&self, id: i64, input: BumdesAddUpdateInputType, image: Option<String>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut table = self.table.write().await;
            let item = table.rows.get_mut(&id).ok_or_else(Self::not_found)?;
            item.title = input.title;
            item.description = input.description;
            item.content = input.content;
            item.category = input.category;
            item.status = input.status;
            item.established = input.established;
            item.manager = input.manager;
            item.revenue = input.revenue;
            item.employees = input.employees;
            item.location = input.location;
            if let Some(image) = image {
                item.image = image;
            }
            item.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.table.write().await.rows.remove(&id).map(|_| ()).ok_or_else(Self::not_found) })
    }
}

/**
 * Process local image bucket.
 */
pub struct InMemoryImageStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    layout: PublicUrlLayout,
}

impl InMemoryImageStorage {
    pub fn new(layout: PublicUrlLayout) -> Self {
        InMemoryImageStorage { objects: RwLock::new(HashMap::new()), layout }
    }

    /**
     * Number of stored objects.
     */
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }
}

impl ImageStorage for InMemoryImageStorage {
    fn upload<'a>(&'a self, path: &'a str, content_type: &'a str, bytes: Vec<u8>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut objects = self.objects.write().await;
            if objects.contains_key(path) {
                return Err(ApplicationError::new(ErrorType::ConstraintViolation, format!("Object already exists: {path}")));
            }
            objects.insert(path.to_string(), StoredObject { content_type: content_type.to_string(), bytes });
            Ok(())
        })
    }

    fn download<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<StoredObject>> {
        Box::pin(async move { Ok(self.objects.read().await.get(path).cloned()) })
    }

    fn remove<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.objects.write().await.remove(path);
            Ok(())
        })
    }

    fn layout(&self) -> &PublicUrlLayout {
        &self.layout
    }
}
