use std::sync::Arc;

use serde_json::Value;

use crate::{
    dao::documents::{DocumentStore, WritePlan},
    model::{
        apperror::ApplicationError,
        db::{BudgetItemsDocument, DocumentKey},
        models::{BudgetItem, BudgetSummary, ExpenditureItem, RevenueItem, SeedOutcome},
    },
    service::{
        decode_document, encode_document,
        seed::{default_expenditure, default_revenue},
        subscription::{Subscription, subscribe_document},
    },
};

/**
 * Side of the budget a list of items belongs to.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetSide {
    Revenue,
    Expenditure,
}

impl BudgetSide {
    fn key(self, year: i32) -> DocumentKey {
        match self {
            BudgetSide::Revenue => DocumentKey::revenue(year),
            BudgetSide::Expenditure => DocumentKey::expenditure(year),
        }
    }

    fn name(self) -> &'static str {
        match self {
            BudgetSide::Revenue => "revenue",
            BudgetSide::Expenditure => "expenditure",
        }
    }
}

fn decode_items(key: &DocumentKey, body: Option<Value>) -> Result<Vec<BudgetItem>, ApplicationError> {
    Ok(decode_document::<BudgetItemsDocument>(key, body)?.map(|document| document.items).unwrap_or_default())
}

/**
 * Builds the writes of one save: the item document of `side` plus the summary of the
 * year recomputed from `items` and the other side's currently stored items.
 *
 * # Arguments
 * `year`: The fiscal year.
 * `side`: Which list is replaced.
 * `items`: The new items of `side`.
 * `current`: Stored bodies of the year's revenue and expenditure documents, in that order.
 */
fn budget_writes(year: i32, side: BudgetSide, items: Vec<BudgetItem>, current: Vec<Option<Value>>) -> Result<Vec<(DocumentKey, Value)>, ApplicationError> {
    let mut current = current.into_iter();
    let stored_revenue = current.next().flatten();
    let stored_expenditure = current.next().flatten();
    let (revenue, expenditure) = match side {
        BudgetSide::Revenue => (items, decode_items(&DocumentKey::expenditure(year), stored_expenditure)?),
        BudgetSide::Expenditure => (decode_items(&DocumentKey::revenue(year), stored_revenue)?, items),
    };
    let summary = BudgetSummary::from_items(year, &revenue, &expenditure)?;
    let saved = match side {
        BudgetSide::Revenue => revenue,
        BudgetSide::Expenditure => expenditure,
    };
    let side_key = side.key(year);
    let summary_key = DocumentKey::summary(year);
    Ok(vec![
        (side_key.clone(), encode_document(&side_key, &BudgetItemsDocument::new(year, saved)?)?),
        (summary_key.clone(), encode_document(&summary_key, &summary)?),
    ])
}

/**
 * Reads, writes and follows the yearly village budget (APBD).
 *
 * Store failures are logged and turned into empty results or `false`.
 */
pub struct BudgetService {
    store: Arc<dyn DocumentStore>,
}

impl BudgetService {
    /**
     * Creates a new instance of `BudgetService`.
     *
     * # Arguments
     * `store`: The document store holding the `budget` collection.
     */
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        BudgetService { store }
    }

    pub async fn get_revenue_data(&self, year: i32) -> Vec<RevenueItem> {
        self.get_items(year, BudgetSide::Revenue).await
    }

    pub async fn get_expenditure_data(&self, year: i32) -> Vec<ExpenditureItem> {
        self.get_items(year, BudgetSide::Expenditure).await
    }

    /**
     * Retrieves the derived summary of a fiscal year.
     *
     * # Arguments
     * `year`: The fiscal year.
     *
     * # Returns
     * The summary, `None` if it does not exist or cannot be read.
     */
    pub async fn get_budget_summary(&self, year: i32) -> Option<BudgetSummary> {
        let key = DocumentKey::summary(year);
        match self.store.get(&key).await.and_then(|body| decode_document::<BudgetSummary>(&key, body)) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!("Error getting budget summary for {}: {}", year, err);
                None
            }
        }
    }

    /**
     * Replaces the revenue lines of a year and rewrites its summary in the same transaction.
     *
     * # Arguments
     * `year`: The fiscal year.
     * `items`: The complete new list of revenue lines.
     *
     * # Returns
     * `true` if both documents were stored.
     */
    pub async fn update_revenue_data(&self, year: i32, items: Vec<RevenueItem>) -> bool {
        self.update_items(year, BudgetSide::Revenue, items).await
    }

    /**
     * Replaces the expenditure lines of a year and rewrites its summary in the same transaction.
     */
    pub async fn update_expenditure_data(&self, year: i32, items: Vec<ExpenditureItem>) -> bool {
        self.update_items(year, BudgetSide::Expenditure, items).await
    }

    pub fn subscribe_to_revenue_data<F>(&self, year: i32, callback: F) -> Subscription
    where
        F: FnMut(Vec<RevenueItem>) + Send + 'static,
    {
        self.subscribe_items(year, BudgetSide::Revenue, callback)
    }

    pub fn subscribe_to_expenditure_data<F>(&self, year: i32, callback: F) -> Subscription
    where
        F: FnMut(Vec<ExpenditureItem>) + Send + 'static,
    {
        self.subscribe_items(year, BudgetSide::Expenditure, callback)
    }

    /**
     * Follows the summary of a fiscal year. The callback receives `None` while it does not exist.
     */
    pub fn subscribe_to_budget_summary<F>(&self, year: i32, callback: F) -> Subscription
    where
        F: FnMut(Option<BudgetSummary>) + Send + 'static,
    {
        let key = DocumentKey::summary(year);
        let decode_key = key.clone();
        subscribe_document(self.store.clone(), key, move |body| decode_document(&decode_key, body), callback)
    }

    /**
     * Seeds the default revenue and expenditure lines and their summary for `year`
     * unless the revenue document already exists.
     *
     * # Returns
     * `Seeded`, `AlreadyInitialized` when nothing was written, or `Failed`.
     */
    pub async fn initialize_budget_data(&self, year: i32) -> SeedOutcome {
        let revenue_key = DocumentKey::revenue(year);
        let plan_key = revenue_key.clone();
        let plan: WritePlan = Box::new(move |current| {
            if current.first().is_some_and(Option::is_some) {
                return Ok(vec![]);
            }
            let revenue = default_revenue(year);
            let expenditure = default_expenditure(year);
            let summary = BudgetSummary::from_items(year, &revenue, &expenditure)?;
            let expenditure_key = DocumentKey::expenditure(year);
            let summary_key = DocumentKey::summary(year);
            Ok(vec![
                (plan_key.clone(), encode_document(&plan_key, &BudgetItemsDocument::new(year, revenue)?)?),
                (expenditure_key.clone(), encode_document(&expenditure_key, &BudgetItemsDocument::new(year, expenditure)?)?),
                (summary_key.clone(), encode_document(&summary_key, &summary)?),
            ])
        });
        match self.store.transact(vec![revenue_key], plan).await {
            Ok(0) => {
                tracing::info!("Budget data for {} already exists, skipping initialization", year);
                SeedOutcome::AlreadyInitialized
            }
            Ok(_) => {
                tracing::info!("Budget data for {} initialized", year);
                SeedOutcome::Seeded
            }
            Err(err) => {
                tracing::error!("Error initializing budget data for {}: {}", year, err);
                SeedOutcome::Failed
            }
        }
    }

    async fn get_items(&self, year: i32, side: BudgetSide) -> Vec<BudgetItem> {
        let key = side.key(year);
        match self.store.get(&key).await.and_then(|body| decode_items(&key, body)) {
            Ok(items) => items,
            Err(err) => {
                tracing::error!("Error getting {} data for {}: {}", side.name(), year, err);
                Vec::new()
            }
        }
    }

    async fn update_items(&self, year: i32, side: BudgetSide, items: Vec<BudgetItem>) -> bool {
        let keys = vec![DocumentKey::revenue(year), DocumentKey::expenditure(year)];
        let plan: WritePlan = Box::new(move |current| budget_writes(year, side, items, current));
        match self.store.transact(keys, plan).await {
            Ok(_) => true,
            Err(err) => {
                tracing::error!("Error updating {} data for {}: {}", side.name(), year, err);
                false
            }
        }
    }

    fn subscribe_items<F>(&self, year: i32, side: BudgetSide, callback: F) -> Subscription
    where
        F: FnMut(Vec<BudgetItem>) + Send + 'static,
    {
        let key = side.key(year);
        let decode_key = key.clone();
        subscribe_document(self.store.clone(), key, move |body| decode_items(&decode_key, body), callback)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{dao::memory::InMemoryDocumentStore, model::models::sum_amounts};

    fn service() -> (BudgetService, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        (BudgetService::new(store.clone()), store)
    }

    fn item(id: &str, amount: Decimal) -> BudgetItem {
        BudgetItem::new(id, id, amount, 2025)
    }

    #[tokio::test]
    async fn test_update_revenue_rewrites_summary() {
        let (service, store) = service();
        assert!(service.update_expenditure_data(2025, vec![item("pembangunan", Decimal::new(40000, 2))]).await);
        assert!(service.update_revenue_data(2025, vec![item("pad", Decimal::new(1000, 0)), item("transfer", Decimal::new(250, 0))]).await);

        let summary = service.get_budget_summary(2025).await.unwrap();
        assert_eq!(summary.total_revenue, Decimal::new(1250, 0));
        assert_eq!(summary.total_expenditure, Decimal::new(400, 0));
        assert_eq!(summary.surplus, summary.total_revenue - summary.total_expenditure);

        let body = store.get(&DocumentKey::revenue(2025)).await.unwrap().unwrap();
        let document: BudgetItemsDocument = serde_json::from_value(body).unwrap();
        assert_eq!(document.total, sum_amounts(&document.items).unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_whole_list() {
        let (service, _) = service();
        assert!(service.update_revenue_data(2025, vec![item("pad", Decimal::ONE), item("transfer", Decimal::TWO)]).await);
        assert!(service.update_revenue_data(2025, vec![item("lainnya", Decimal::TEN)]).await);
        let revenue = service.get_revenue_data(2025).await;
        assert_eq!(revenue.len(), 1);
        assert_eq!(service.get_budget_summary(2025).await.unwrap().total_revenue, Decimal::TEN);
    }

    #[tokio::test]
    async fn test_years_are_independent() {
        let (service, _) = service();
        assert!(service.update_revenue_data(2024, vec![item("pad", Decimal::ONE)]).await);
        assert!(service.get_revenue_data(2025).await.is_empty());
        assert!(service.get_budget_summary(2025).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_other_side_fails_the_save() {
        let (service, store) = service();
        store.set(&DocumentKey::expenditure(2025), json!({ "items": 5 })).await.unwrap();
        assert!(!service.update_revenue_data(2025, vec![item("pad", Decimal::ONE)]).await);
        assert!(service.get_revenue_data(2025).await.is_empty());
        assert!(service.get_budget_summary(2025).await.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_fail_the_save() {
        let (service, _) = service();
        assert!(service.update_expenditure_data(2025, vec![item("pembangunan", Decimal::new(400, 0))]).await);
        assert!(!service.update_revenue_data(2025, vec![item("pad", Decimal::MAX), item("transfer", Decimal::MAX)]).await);
        assert!(service.get_revenue_data(2025).await.is_empty());
        assert_eq!(service.get_budget_summary(2025).await.unwrap().total_revenue, Decimal::ZERO);

        assert!(service.update_revenue_data(2025, vec![item("pad", Decimal::MAX)]).await);
        assert!(!service.update_expenditure_data(2025, vec![item("pembangunan", Decimal::MIN)]).await);
        assert_eq!(service.get_expenditure_data(2025).await[0].amount, Decimal::new(400, 0));
    }

    #[tokio::test]
    async fn test_initialize_budget_once() {
        let (service, _) = service();
        assert_eq!(service.initialize_budget_data(2024).await, SeedOutcome::Seeded);
        let summary = service.get_budget_summary(2024).await.unwrap();
        assert_eq!(summary.total_revenue, Decimal::new(2_414_959_700, 0));
        assert_eq!(summary.total_expenditure.to_string(), "2776567200.34");
        assert_eq!(summary.surplus, summary.total_revenue - summary.total_expenditure);
        assert_eq!(service.get_expenditure_data(2024).await.len(), 5);

        assert!(service.update_revenue_data(2024, vec![item("pad", Decimal::ONE)]).await);
        assert_eq!(service.initialize_budget_data(2024).await, SeedOutcome::AlreadyInitialized);
        assert_eq!(service.get_revenue_data(2024).await.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_subscription_follows_saves() {
        let (service, _) = service();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = service.subscribe_to_budget_summary(2025, move |summary| drop(sender.send(summary)));
        assert!(tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap().is_none());

        assert!(service.update_revenue_data(2025, vec![item("pad", Decimal::new(500, 0))]).await);
        let summary = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap().unwrap();
        assert_eq!(summary.surplus, Decimal::new(500, 0));
    }
}
