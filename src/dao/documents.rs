use std::time::Duration;

use serde_json::Value;
use sqlx::{PgConnection, Pool, Postgres, postgres::PgListener, types::Json};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{Instrument, instrument};

use crate::{
    dao::StoreFuture,
    model::{
        apperror::{ApplicationError, ErrorType},
        db::DocumentKey,
    },
};

/**
 * Computes the writes of a transaction from the current bodies of the locked keys,
 * given in the order the keys were passed. Returning no writes leaves the store untouched.
 */
pub type WritePlan = Box<dyn FnOnce(Vec<Option<Value>>) -> Result<Vec<(DocumentKey, Value)>, ApplicationError> + Send>;

/**
 * Number of change notifications buffered per subscriber.
 */
pub const CHANGE_BUFFER: usize = 256;

/**
 * Change notification broadcast to watchers.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    /** The document with this key was written. */
    Written(DocumentKey),
    /** Notifications may have been lost, every watched document has to be read again. */
    Resync,
}

/**
 * Document store with change notifications, addressed by `collection/id`.
 */
pub trait DocumentStore: Send + Sync {
    /**
     * Reads the body of a document, `None` if it does not exist.
     */
    fn get<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<Value>>;

    /**
     * Overwrites the whole body of a document, creating it if needed.
     */
    fn set<'a>(&'a self, key: &'a DocumentKey, body: Value) -> StoreFuture<'a, ()>;

    /**
     * Locks `keys`, hands their current bodies to `plan` and applies the returned writes
     * atomically.
     *
     * # Returns
     * The number of documents written.
     */
    fn transact(&self, keys: Vec<DocumentKey>, plan: WritePlan) -> StoreFuture<'_, usize>;

    /**
     * Receives a change for every document written after this call.
     */
    fn watch(&self) -> broadcast::Receiver<DocumentChange>;
}

/**
 * Channel used for `pg_notify` change notifications.
 */
const DOCUMENT_CHANGES_CHANNEL: &str = "document_changes";

/**
 * SQL query to read a document body.
 */
const QUERY_DOCUMENT: &str = "SELECT body FROM documents WHERE collection = $1 AND id = $2";

/**
 * SQL query to create or overwrite a document body.
 */
const UPSERT_DOCUMENT: &str = "INSERT INTO documents (collection, id, body, updated_at) VALUES ($1, $2, $3, now())
                               ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body, updated_at = now()";

/**
 * SQL query to announce a changed document. Delivered when the transaction commits.
 */
const NOTIFY_CHANGE: &str = "SELECT pg_notify($1, $2)";

/**
 * SQL query taking a transaction scoped lock on a document key. Works for documents
 * that do not exist yet, unlike row locks.
 */
const LOCK_DOCUMENT: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

/**
 * `PostgreSQL` backed document store using the `documents` table.
 */
pub struct PgDocumentStore {
    connection_pool: Pool<Postgres>,
    changes: broadcast::Sender<DocumentChange>,
}

impl PgDocumentStore {
    /**
     * Creates a new instance of `PgDocumentStore`. Call `start_listener` to receive
     * changes made by other server instances as well.
     *
     * # Arguments
     * `connection_pool`: The database connection pool.
     */
    pub fn new(connection_pool: Pool<Postgres>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        PgDocumentStore { connection_pool, changes }
    }

    /**
     * Starts forwarding `document_changes` notifications to watchers. When the listener
     * connection is lost it is reopened and watchers get a `DocumentChange::Resync`.
     *
     * # Returns
     * Handle of the background listener task.
     */
    pub async fn start_listener(&self) -> Result<JoinHandle<()>, ApplicationError> {
        let mut listener = Self::connect_listener(&self.connection_pool).await?;
        let connection_pool = self.connection_pool.clone();
        let changes = self.changes.clone();
        Ok(tokio::spawn(async move {
            loop {
                let failure = match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        forward_notification(&changes, notification.payload());
                        continue;
                    }
                    Ok(None) => "connection closed".to_string(),
                    Err(err) => err.to_string(),
                };
                tracing::error!("Document change listener failed: {failure}");
                listener = Self::reconnect_listener(&connection_pool).await;
                // Writes committed while disconnected were never announced
                drop(changes.send(DocumentChange::Resync));
            }
        }))
    }

    async fn connect_listener(connection_pool: &Pool<Postgres>) -> Result<PgListener, ApplicationError> {
        let mut listener = PgListener::connect_with(connection_pool)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to connect change listener: {err}")))?;
        listener
            .listen(DOCUMENT_CHANGES_CHANNEL)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to listen for document changes: {err}")))?;
        Ok(listener)
    }

    async fn reconnect_listener(connection_pool: &Pool<Postgres>) -> PgListener {
        loop {
            match Self::connect_listener(connection_pool).await {
                Ok(listener) => {
                    tracing::info!("Document change listener reconnected");
                    return listener;
                }
                Err(err) => {
                    tracing::error!("{err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn get_document(&self, key: &DocumentKey) -> Result<Option<Value>, ApplicationError> {
        let span = tracing::Span::current();
        let mut connection = self
            .connection_pool
            .acquire()
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))?;
        Self::fetch(&mut connection, key).await
    }

    #[instrument(skip(self, key, body), fields(key = %key))]
    async fn set_document(&self, key: &DocumentKey, body: Value) -> Result<(), ApplicationError> {
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        Self::write(&mut transaction, key, &body).await?;
        transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
        Ok(())
    }

    #[instrument(skip(self, keys, plan), fields(key_count = keys.len(), result))]
    async fn transact_documents(&self, keys: Vec<DocumentKey>, plan: WritePlan) -> Result<usize, ApplicationError> {
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        let mut lock_order = keys.clone();
        lock_order.sort();
        lock_order.dedup();
        for key in &lock_order {
            sqlx::query(LOCK_DOCUMENT)
                .bind(key.to_string())
                .execute(&mut *transaction)
                .await
                .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to lock document {key}: {err}")))?;
        }
        let mut current = Vec::with_capacity(keys.len());
        for key in &keys {
            current.push(Self::fetch(&mut transaction, key).await?);
        }
        let writes = match plan(current) {
            Ok(writes) => writes,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        };
        for (key, body) in &writes {
            Self::write(&mut transaction, key, body).await?;
        }
        transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
        tracing::Span::current().record("result", writes.len());
        Ok(writes.len())
    }

    async fn fetch(connection: &mut PgConnection, key: &DocumentKey) -> Result<Option<Value>, ApplicationError> {
        let row: Option<(Json<Value>,)> = sqlx::query_as(QUERY_DOCUMENT)
            .bind(&key.collection)
            .bind(&key.id)
            .fetch_optional(connection)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read document {key}: {err}")))?;
        Ok(row.map(|(body,)| body.0))
    }

    async fn write(connection: &mut PgConnection, key: &DocumentKey, body: &Value) -> Result<(), ApplicationError> {
        sqlx::query(UPSERT_DOCUMENT)
            .bind(&key.collection)
            .bind(&key.id)
            .bind(Json(body))
            .execute(&mut *connection)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to write document {key}: {err}")))?;
        sqlx::query(NOTIFY_CHANGE)
            .bind(DOCUMENT_CHANGES_CHANNEL)
            .bind(key.to_string())
            .execute(connection)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to notify change of {key}: {err}")))?;
        Ok(())
    }
}

impl DocumentStore for PgDocumentStore {
    fn get<'a>(&'a self, key: &'a DocumentKey) -> StoreFuture<'a, Option<Value>> {
        Box::pin(self.get_document(key))
    }

    fn set<'a>(&'a self, key: &'a DocumentKey, body: Value) -> StoreFuture<'a, ()> {
        Box::pin(self.set_document(key, body))
    }

    fn transact(&self, keys: Vec<DocumentKey>, plan: WritePlan) -> StoreFuture<'_, usize> {
        Box::pin(self.transact_documents(keys, plan))
    }

    fn watch(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

/**
 * Broadcasts the key named by a `document_changes` payload.
 */
fn forward_notification(changes: &broadcast::Sender<DocumentChange>, payload: &str) {
    match DocumentKey::parse(payload) {
        // No receivers is not an error
        Some(key) => drop(changes.send(DocumentChange::Written(key))),
        None => tracing::warn!("Ignoring malformed document change notification: {payload}"),
    }
}


#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use serde_json::json;
    use sqlx::PgPool;

    #[tokio::test]
    async fn test_set_then_get_document() {
        let store = PgDocumentStore::new(init_db().await);
        let key = DocumentKey::new("integration", "set-then-get");
        store.set(&key, json!({ "total": 3 })).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({ "total": 3 })));
    }

    #[tokio::test]
    async fn test_transact_skips_existing_document() {
        let store = PgDocumentStore::new(init_db().await);
        let key = DocumentKey::new("integration", "seed-once");
        store.set(&key, json!({ "seeded": true })).await.unwrap();
        let plan_key = key.clone();
        let written = store
            .transact(vec![key.clone()], Box::new(move |current| if current[0].is_some() { Ok(vec![]) } else { Ok(vec![(plan_key, json!({ "seeded": false }))]) }))
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({ "seeded": true })));
    }

    #[tokio::test]
    async fn test_listener_forwards_changes() {
        let store = PgDocumentStore::new(init_db().await);
        let _listener = store.start_listener().await.unwrap();
        let mut changes = store.watch();
        let key = DocumentKey::new("integration", "notified");
        store.set(&key, json!({})).await.unwrap();
        let changed = tokio::time::timeout(Duration::from_secs(5), changes.recv()).await.unwrap().unwrap();
        assert_eq!(changed, DocumentChange::Written(key));
    }

    /**
     * Initialize the database connection pool.
     */
    async fn init_db() -> PgPool {
        dotenv::from_filename("./sqlx-postgresql-migration/.env-test").ok();
        let pool = PgPool::connect(dotenv::var("DATABASE_URL").unwrap().as_str()).await.unwrap();
        sqlx::migrate!("./sqlx-postgresql-migration/migrations").run(&pool).await.unwrap();
        pool
    }
}
