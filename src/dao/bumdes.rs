use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, Pool, Postgres};
use tracing::{Instrument, instrument};

use crate::{
    dao::StoreFuture,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{BumdesAddUpdateInputType, BumdesItem, BumdesStatus},
    },
};

/**
 * Relational storage of the BUMDes catalog.
 */
pub trait BumdesStore: Send + Sync {
    /**
     * All entries, newest first.
     */
    fn list(&self) -> StoreFuture<'_, Vec<BumdesItem>>;

    fn get(&self, id: i64) -> StoreFuture<'_, Option<BumdesItem>>;

    fn insert(&self, input: BumdesAddUpdateInputType, image: String) -> StoreFuture<'_, BumdesItem>;

    /**
     * Overwrites the form fields of an entry. The image is only replaced when `image` is given.
     */
    fn update(&self, id: i64, input: BumdesAddUpdateInputType, image: Option<String>) -> StoreFuture<'_, ()>;

    fn delete(&self, id: i64) -> StoreFuture<'_, ()>;
}

/**
 * Database response type for querying BUMDes rows.
 */
pub type QueryBumdesDbResp = (i64, String, String, String, String, String, String, NaiveDate, String, i64, i64, String, DateTime<Utc>, Option<DateTime<Utc>>);

const BUMDES_COLUMNS: &str = "id, title, description, content, image, category, status, established, manager, revenue, employees, location, created_at, updated_at";

/**
 * SQL query to retrieve the catalog, newest first.
 */
const QUERY_BUMDES_LIST: &str = "SELECT id, title, description, content, image, category, status, established, manager, revenue, employees, location, created_at, updated_at FROM bumdes ORDER BY created_at DESC, id DESC";

/**
 * SQL query to retrieve one entry.
 */
const QUERY_BUMDES: &str = "SELECT id, title, description, content, image, category, status, established, manager, revenue, employees, location, created_at, updated_at FROM bumdes WHERE id = $1";

/**
 * SQL query to update an entry. `$11` keeps the current image when null.
 */
const UPDATE_BUMDES: &str = "UPDATE bumdes SET title = $1, description = $2, content = $3, category = $4, status = $5, established = $6, manager = $7, revenue = $8, employees = $9, location = $10,
                             image = COALESCE($11, image), updated_at = now() WHERE id = $12";

/**
 * SQL query to delete an entry.
 */
const DELETE_BUMDES: &str = "DELETE FROM bumdes WHERE id = $1";

impl TryFrom<QueryBumdesDbResp> for BumdesItem {
    type Error = ApplicationError;

    fn try_from(row: QueryBumdesDbResp) -> Result<Self, Self::Error> {
        let (id, title, description, content, image, category, status, established, manager, revenue, employees, location, created_at, updated_at) = row;
        Ok(BumdesItem {
            id,
            title,
            description,
            content,
            image,
            category,
            status: BumdesStatus::from_str(&status).map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Invalid status stored for BUMDes {id}: {err}")))?,
            established,
            manager,
            revenue,
            employees,
            location,
            created_at,
            updated_at,
        })
    }
}

/**
 * DAO for the `bumdes` table.
 */
pub struct PgBumdesDao {
    connection_pool: Pool<Postgres>,
}

impl PgBumdesDao {
    /**
     * Creates a new instance of `PgBumdesDao`.
     *
     * # Arguments
     * `connection_pool`: The database connection pool.
     */
    pub fn new(connection_pool: Pool<Postgres>) -> Self {
        PgBumdesDao { connection_pool }
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }

    #[instrument(skip(self), fields(result))]
    async fn get_bumdes_list(&self) -> Result<Vec<BumdesItem>, ApplicationError> {
        let span = tracing::Span::current();
        let mut connection = self.connection().await?;
        let results: Vec<QueryBumdesDbResp> = sqlx::query_as(QUERY_BUMDES_LIST)
            .fetch_all(&mut *connection)
            .instrument(span.clone())
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get BUMDes list: {err}")))?;
        span.record("result", results.len());
        results.into_iter().map(BumdesItem::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn get_bumdes(&self, id: i64) -> Result<Option<BumdesItem>, ApplicationError> {
        let mut connection = self.connection().await?;
        Self::fetch_bumdes(&mut connection, id).await
    }

    async fn fetch_bumdes(connection: &mut PgConnection, id: i64) -> Result<Option<BumdesItem>, ApplicationError> {
        let result: Option<QueryBumdesDbResp> = sqlx::query_as(QUERY_BUMDES)
            .bind(id)
            .fetch_optional(connection)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get BUMDes {id}: {err}")))?;
        result.map(BumdesItem::try_from).transpose()
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    async fn add_bumdes(&self, input: BumdesAddUpdateInputType, image: String) -> Result<BumdesItem, ApplicationError> {
        let span = tracing::Span::current();
        let mut connection = self.connection().await?;
        let row: QueryBumdesDbResp = sqlx::query_as(&format!(
            "INSERT INTO bumdes (title, description, content, image, category, status, established, manager, revenue, employees, location, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now()) RETURNING {BUMDES_COLUMNS}"
        ))
        .bind(input.title)
        .bind(input.description)
        .bind(input.content)
        .bind(image)
        .bind(input.category)
        .bind(input.status.as_str())
        .bind(input.established)
        .bind(input.manager)
        .bind(input.revenue)
        .bind(input.employees)
        .bind(input.location)
        .fetch_one(&mut *connection)
        .instrument(span)
        .await
        .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        BumdesItem::try_from(row)
    }

    #[instrument(skip(self, input))]
    async fn update_bumdes(&self, id: i64, input: BumdesAddUpdateInputType, image: Option<String>) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let mut connection = self.connection().await?;
        let result = sqlx::query(UPDATE_BUMDES)
            .bind(input.title)
            .bind(input.description)
            .bind(input.content)
            .bind(input.category)
            .bind(input.status.as_str())
            .bind(input.established)
            .bind(input.manager)
            .bind(input.revenue)
            .bind(input.employees)
            .bind(input.location)
            .bind(image)
            .bind(id)
            .execute(&mut *connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("BUMDes with id {} not found for update", id);
            return Err(ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_bumdes(&self, id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let mut connection = self.connection().await?;
        let result = sqlx::query(DELETE_BUMDES)
            .bind(id)
            .execute(&mut *connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete BUMDes: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("BUMDes with id {} not found for deletion", id);
            return Err(ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()));
        }
        Ok(())
    }

    /**
     * Handles database errors and maps them to application errors.
     *
     * # Arguments
     * `error`: The database error to handle.
     *
     * # Returns
     * An `ApplicationError` corresponding to the database error.
     */
    fn handle_database_error(error: Option<&dyn sqlx::error::DatabaseError>) -> ApplicationError {
        if let Some(db_error) = error {
            tracing::debug!("Database error: {}", db_error);
            tracing::info!("Add/Update error: {:?}", db_error.code());
            if db_error.code() == Some(Cow::Borrowed("23505")) {
                // Unique violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("23514")) {
                // Check violation
                return ApplicationError::new(ErrorType::Validation, "Value not allowed".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("22001")) {
                // Value too long
                return ApplicationError::new(ErrorType::Validation, "Value too long".to_string());
            }
            tracing::error!("Unhandled database error: {}", db_error);
            return ApplicationError::new(ErrorType::DatabaseError, "Unhandled database error".to_string());
        }
        ApplicationError::new(ErrorType::DatabaseError, "Failed to execute database operation".to_string())
    }
}

impl BumdesStore for PgBumdesDao {
    fn list(&self) -> StoreFuture<'_, Vec<BumdesItem>> {
        Box::pin(self.get_bumdes_list())
    }

    fn get(&self, id: i64) -> StoreFuture<'_, Option<BumdesItem>> {
        Box::pin(self.get_bumdes(id))
    }

    fn insert(&self, input: BumdesAddUpdateInputType, image: String) -> StoreFuture<'_, BumdesItem> {
        Box::pin(self.add_bumdes(input, image))
    }

    fn update(&self, id: i64, input: BumdesAddUpdateInputType, image: Option<String>) -> StoreFuture<'_, ()> {
        Box::pin(self.update_bumdes(id, input, image))
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(self.delete_bumdes(id))
    }
}

/**
 * Catalog compiled into the binary, served when the primary store is unavailable.
 */
const BUNDLED_BUMDES_JSON: &str = include_str!("../../data/bumdes.json");

#[derive(Deserialize)]
struct BundledBumdesFile {
    #[serde(default)]
    bumdes: Vec<BumdesItem>,
}

/**
 * Static secondary source of the BUMDes catalog.
 */
#[derive(Clone)]
pub struct BundledBumdes {
    contents: &'static str,
}

impl BundledBumdes {
    pub fn new() -> Self {
        BundledBumdes { contents: BUNDLED_BUMDES_JSON }
    }

    #[cfg(test)]
    pub fn from_static(contents: &'static str) -> Self {
        BundledBumdes { contents }
    }

    /**
     * Entries of the bundled catalog, newest first.
     */
    pub fn load(&self) -> Result<Vec<BumdesItem>, ApplicationError> {
        let file: BundledBumdesFile = serde_json::from_str(self.contents).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to parse bundled BUMDes data: {err}")))?;
        let mut items = file.bumdes;
        items.sort_by(|left, right| right.created_at.cmp(&left.created_at).then(right.id.cmp(&left.id)));
        Ok(items)
    }
}
