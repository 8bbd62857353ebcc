use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{apperror::ApplicationError, models::BudgetItem};

pub const DEMOGRAPHICS_COLLECTION: &str = "demographics";
pub const BUDGET_COLLECTION: &str = "budget";

pub const POPULATION_DOC: &str = "population";
pub const RELIGIONS_DOC: &str = "religions";
pub const JOBS_DOC: &str = "jobs";
pub const EDUCATION_DOC: &str = "education";

/**
 * Address of a document in the document store, rendered as `collection/id`.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: &str, id: &str) -> Self {
        DocumentKey { collection: collection.to_string(), id: id.to_string() }
    }

    pub fn demographics(id: &str) -> Self {
        DocumentKey::new(DEMOGRAPHICS_COLLECTION, id)
    }

    pub fn revenue(year: i32) -> Self {
        DocumentKey::new(BUDGET_COLLECTION, &format!("revenue-{year}"))
    }

    pub fn expenditure(year: i32) -> Self {
        DocumentKey::new(BUDGET_COLLECTION, &format!("expenditure-{year}"))
    }

    pub fn summary(year: i32) -> Self {
        DocumentKey::new(BUDGET_COLLECTION, &format!("summary-{year}"))
    }

    /**
     * Parses a `collection/id` path as carried by change notifications.
     */
    pub fn parse(path: &str) -> Option<Self> {
        let (collection, id) = path.split_once('/')?;
        if collection.is_empty() || id.is_empty() {
            return None;
        }
        Some(DocumentKey::new(collection, id))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/**
 * Body of the religion, job and education documents.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsDocument<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub last_updated: DateTime<Utc>,
}

impl<T> ItemsDocument<T> {
    pub fn new(items: Vec<T>) -> Self {
        ItemsDocument { items, last_updated: Utc::now() }
    }
}

/**
 * Body of the `revenue-{year}` and `expenditure-{year}` documents.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItemsDocument {
    pub year: i32,
    #[serde(default)]
    pub items: Vec<BudgetItem>,
    pub total: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl BudgetItemsDocument {
    pub fn new(year: i32, items: Vec<BudgetItem>) -> Result<Self, ApplicationError> {
        let total = crate::model::models::sum_amounts(&items)?;
        Ok(BudgetItemsDocument { year, items, total, last_updated: Utc::now() })
    }
}
