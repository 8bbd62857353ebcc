use std::sync::Arc;

use serde_json::Value;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use crate::{
    dao::documents::{DocumentChange, DocumentStore},
    model::{apperror::ApplicationError, db::DocumentKey},
};

/**
 * Live feed of one document. The feed stops when the handle is dropped or
 * `unsubscribe` is called.
 */
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /**
     * Stops the feed. No callback runs after this returns.
     */
    pub fn unsubscribe(self) {
        drop(self);
    }

    /**
     * Whether the feed is still running. A feed ends on its own when the store shuts down.
     */
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/**
 * Subscribes `callback` to the document at `key`.
 *
 * # Arguments
 * `store`: The document store to watch.
 * `key`: The document to follow.
 * `decode`: Turns a raw body, `None` when the document does not exist, into the callback value.
 * `callback`: Receives the current value first, then the value after every change.
 *
 * # Returns
 * The `Subscription` owning the feed.
 */
pub fn subscribe_document<T, D, F>(store: Arc<dyn DocumentStore>, key: DocumentKey, decode: D, mut callback: F) -> Subscription
where
    T: Send + 'static,
    D: Fn(Option<Value>) -> Result<T, ApplicationError> + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    // Subscribe before the first read so no change between the two is missed
    let mut changes = store.watch();
    let handle = tokio::spawn(async move {
        deliver(store.as_ref(), &key, &decode, &mut callback).await;
        loop {
            match changes.recv().await {
                Ok(DocumentChange::Written(changed)) if changed == key => deliver(store.as_ref(), &key, &decode, &mut callback).await,
                Ok(DocumentChange::Written(_)) => {}
                Ok(DocumentChange::Resync) => deliver(store.as_ref(), &key, &decode, &mut callback).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscription to {} lagged {} changes, re-reading", key, skipped);
                    deliver(store.as_ref(), &key, &decode, &mut callback).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    Subscription { handle }
}

async fn deliver<T, D, F>(store: &dyn DocumentStore, key: &DocumentKey, decode: &D, callback: &mut F)
where
    D: Fn(Option<Value>) -> Result<T, ApplicationError>,
    F: FnMut(T),
{
    match store.get(key).await.and_then(decode) {
        Ok(value) => callback(value),
        Err(err) => tracing::error!("Error reading subscribed document {}: {}", key, err),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::dao::{StoreFuture, documents::WritePlan, memory::InMemoryDocumentStore};
    use serde_json::json;
    use tokio::sync::{broadcast, mpsc};

    /**
     * Store whose writes are never announced, as when the change listener is disconnected.
     */
    struct SilentDocumentStore {
        documents: InMemoryDocumentStore,
        changes: broadcast::Sender<DocumentChange>,
    }

    impl DocumentStore for SilentDocumentStore {
        fn get<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<Value>> {
            self.documents.get(key)
        }

        fn set<'a>(&'a self, key: &'a DocumentKey, body: Value) -> StoreFuture<'a, ()> {
            self.documents.set(key, body)
        }

        fn transact(&self, keys: Vec<DocumentKey>, plan: WritePlan) -> StoreFuture<'_, usize> {
            self.documents.transact(keys, plan)
        }

        fn watch(&self) -> broadcast::Receiver<DocumentChange> {
            self.changes.subscribe()
        }
    }

    fn identity(body: Option<Value>) -> Result<Option<Value>, ApplicationError> {
        Ok(body)
    }

    async fn next(receiver: &mut mpsc::UnboundedReceiver<Option<Value>>) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_initial_value_then_changes() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let key = DocumentKey::demographics("population");
        store.set(&key, json!({ "total": 1 })).await.unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = subscribe_document(store.clone(), key.clone(), identity, move |value| drop(sender.send(value)));

        assert_eq!(next(&mut receiver).await, Some(json!({ "total": 1 })));
        store.set(&key, json!({ "total": 2 })).await.unwrap();
        assert_eq!(next(&mut receiver).await, Some(json!({ "total": 2 })));
    }

    #[tokio::test]
    async fn test_other_documents_are_ignored() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let key = DocumentKey::demographics("jobs");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = subscribe_document(store.clone(), key.clone(), identity, move |value| drop(sender.send(value)));

        assert_eq!(next(&mut receiver).await, None);
        store.set(&DocumentKey::demographics("education"), json!({})).await.unwrap();
        store.set(&key, json!({ "items": [] })).await.unwrap();
        assert_eq!(next(&mut receiver).await, Some(json!({ "items": [] })));
    }

    #[tokio::test]
    async fn test_resync_rereads_document() {
        let changes = broadcast::channel(8).0;
        let store = Arc::new(SilentDocumentStore { documents: InMemoryDocumentStore::new(), changes: changes.clone() });
        let key = DocumentKey::demographics("jobs");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = subscribe_document(store.clone(), key.clone(), identity, move |value| drop(sender.send(value)));
        assert_eq!(next(&mut receiver).await, None);

        store.set(&key, json!({ "items": [1] })).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(200), receiver.recv()).await.is_err());
        changes.send(DocumentChange::Resync).unwrap();
        assert_eq!(next(&mut receiver).await, Some(json!({ "items": [1] })));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_feed() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let key = DocumentKey::demographics("religions");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscription = subscribe_document(store.clone(), key.clone(), identity, move |value| drop(sender.send(value)));
        assert!(subscription.is_active());
        next(&mut receiver).await;

        subscription.unsubscribe();
        store.set(&key, json!({ "items": [] })).await.unwrap();
        // The callback and its sender are dropped with the aborted task
        assert_eq!(tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap(), None);
    }
}
