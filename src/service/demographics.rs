use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    dao::documents::{DocumentStore, WritePlan},
    model::{
        apperror::ApplicationError,
        db::{DocumentKey, EDUCATION_DOC, ItemsDocument, JOBS_DOC, POPULATION_DOC, RELIGIONS_DOC},
        models::{EducationRecord, GenderedCount, JobRecord, PopulationRecord, ReligionRecord, SeedOutcome},
    },
    service::{
        decode_document, encode_document,
        seed::demographic_seed,
        subscription::{Subscription, subscribe_document},
    },
};

/**
 * Reads, writes and follows the demographic documents of the village.
 *
 * Store failures never reach the caller: they are logged and reads return
 * `None` or an empty list, writes return `false`.
 */
pub struct DemographicService {
    store: Arc<dyn DocumentStore>,
}

impl DemographicService {
    /**
     * Creates a new instance of `DemographicService`.
     *
     * # Arguments
     * `store`: The document store holding the `demographics` collection.
     */
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        DemographicService { store }
    }

    /**
     * Retrieves the population totals.
     *
     * # Returns
     * The population record, `None` if it does not exist or cannot be read.
     */
    pub async fn get_population_data(&self) -> Option<PopulationRecord> {
        let key = DocumentKey::demographics(POPULATION_DOC);
        match self.store.get(&key).await.and_then(|body| decode_document::<PopulationRecord>(&key, body)) {
            Ok(population) => population,
            Err(err) => {
                tracing::error!("Error getting population data: {}", err);
                None
            }
        }
    }

    pub async fn get_religions_data(&self) -> Vec<ReligionRecord> {
        self.get_items(RELIGIONS_DOC).await
    }

    pub async fn get_jobs_data(&self) -> Vec<JobRecord> {
        self.get_items(JOBS_DOC).await
    }

    pub async fn get_education_data(&self) -> Vec<EducationRecord> {
        self.get_items(EDUCATION_DOC).await
    }

    /**
     * Overwrites the population totals. The total is always derived from `male` and `female`.
     *
     * # Arguments
     * `male`: Number of male residents.
     * `female`: Number of female residents.
     *
     * # Returns
     * `true` if the record was stored.
     */
    pub async fn update_population_data(&self, male: i64, female: i64) -> bool {
        let key = DocumentKey::demographics(POPULATION_DOC);
        let result = match encode_document(&key, &PopulationRecord::new(male, female)) {
            Ok(body) => self.store.set(&key, body).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Error updating population data: {}", err);
                false
            }
        }
    }

    /**
     * Replaces the whole religion list. Totals of every entry are recomputed.
     */
    pub async fn update_religions_data(&self, religions: Vec<ReligionRecord>) -> bool {
        self.update_items(RELIGIONS_DOC, religions).await
    }

    /**
     * Replaces the whole job list. Totals of every entry are recomputed.
     */
    pub async fn update_jobs_data(&self, jobs: Vec<JobRecord>) -> bool {
        self.update_items(JOBS_DOC, jobs).await
    }

    /**
     * Replaces the whole education list. Totals of every entry are recomputed.
     */
    pub async fn update_education_data(&self, education: Vec<EducationRecord>) -> bool {
        self.update_items(EDUCATION_DOC, education).await
    }

    /**
     * Follows the population record.
     *
     * # Arguments
     * `callback`: Receives the current record, then the record after every change. `None` while it does not exist.
     */
    pub fn subscribe_to_population_data<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Option<PopulationRecord>) + Send + 'static,
    {
        let key = DocumentKey::demographics(POPULATION_DOC);
        let decode_key = key.clone();
        subscribe_document(self.store.clone(), key, move |body| decode_document(&decode_key, body), callback)
    }

    pub fn subscribe_to_religions_data<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Vec<ReligionRecord>) + Send + 'static,
    {
        self.subscribe_items(RELIGIONS_DOC, callback)
    }

    pub fn subscribe_to_jobs_data<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Vec<JobRecord>) + Send + 'static,
    {
        self.subscribe_items(JOBS_DOC, callback)
    }

    pub fn subscribe_to_education_data<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Vec<EducationRecord>) + Send + 'static,
    {
        self.subscribe_items(EDUCATION_DOC, callback)
    }

    /**
     * Seeds all four demographic documents with generated figures unless the population
     * document already exists. Check and writes run in one store transaction.
     *
     * # Returns
     * `Seeded`, `AlreadyInitialized` when nothing was written, or `Failed`.
     */
    pub async fn initialize_demographic_data(&self) -> SeedOutcome {
        let seed = demographic_seed(&mut StdRng::from_entropy());
        let population_key = DocumentKey::demographics(POPULATION_DOC);
        let plan_key = population_key.clone();
        let plan: WritePlan = Box::new(move |current| {
            if current.first().is_some_and(Option::is_some) {
                return Ok(vec![]);
            }
            let religions_key = DocumentKey::demographics(RELIGIONS_DOC);
            let jobs_key = DocumentKey::demographics(JOBS_DOC);
            let education_key = DocumentKey::demographics(EDUCATION_DOC);
            Ok(vec![
                (plan_key.clone(), encode_document(&plan_key, &seed.population)?),
                (religions_key.clone(), encode_document(&religions_key, &ItemsDocument::new(seed.religions))?),
                (jobs_key.clone(), encode_document(&jobs_key, &ItemsDocument::new(seed.jobs))?),
                (education_key.clone(), encode_document(&education_key, &ItemsDocument::new(seed.education))?),
            ])
        });
        match self.store.transact(vec![population_key], plan).await {
            Ok(0) => {
                tracing::info!("Demographic data already exists, skipping initialization");
                SeedOutcome::AlreadyInitialized
            }
            Ok(_) => {
                tracing::info!("Demographic data initialized");
                SeedOutcome::Seeded
            }
            Err(err) => {
                tracing::error!("Error initializing demographic data: {}", err);
                SeedOutcome::Failed
            }
        }
    }

    async fn get_items<T: DeserializeOwned>(&self, doc: &str) -> Vec<T> {
        let key = DocumentKey::demographics(doc);
        match self.store.get(&key).await.and_then(|body| decode_document::<ItemsDocument<T>>(&key, body)) {
            Ok(document) => document.map(|document| document.items).unwrap_or_default(),
            Err(err) => {
                tracing::error!("Error getting {} data: {}", doc, err);
                Vec::new()
            }
        }
    }

    async fn update_items<T: GenderedCount + Serialize>(&self, doc: &str, mut items: Vec<T>) -> bool {
        items.iter_mut().for_each(|item| item.recompute_total());
        let key = DocumentKey::demographics(doc);
        let result = match encode_document(&key, &ItemsDocument::new(items)) {
            Ok(body) => self.store.set(&key, body).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Error updating {} data: {}", doc, err);
                false
            }
        }
    }

    fn subscribe_items<T, F>(&self, doc: &str, callback: F) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(Vec<T>) + Send + 'static,
    {
        let key = DocumentKey::demographics(doc);
        let decode_key = key.clone();
        let decode = move |body: Option<Value>| -> Result<Vec<T>, ApplicationError> { Ok(decode_document::<ItemsDocument<T>>(&decode_key, body)?.map(|document| document.items).unwrap_or_default()) };
        subscribe_document(self.store.clone(), key, decode, callback)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::{broadcast, mpsc};

    use super::*;
    use crate::{
        dao::{StoreFuture, documents::DocumentChange, memory::InMemoryDocumentStore},
        model::apperror::ErrorType,
    };

    /**
     * Store whose every call fails.
     */
    struct FailingDocumentStore {
        changes: broadcast::Sender<DocumentChange>,
    }

    impl FailingDocumentStore {
        fn new() -> Self {
            FailingDocumentStore { changes: broadcast::channel(8).0 }
        }

        fn error() -> ApplicationError {
            ApplicationError::new(ErrorType::DatabaseError, "connection refused".to_string())
        }
    }

    impl DocumentStore for FailingDocumentStore {
        fn get<'a>(&'a self, _key: &'a DocumentKey) -> StoreFuture<'a, Option<Value>> {
            Box::pin(async { Err(Self::error()) })
        }

        fn set<'a>(&'a self, _key: &'a DocumentKey, _body: Value) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(Self::error()) })
        }

        fn transact(&self, _keys: Vec<DocumentKey>, _plan: WritePlan) -> StoreFuture<'_, usize> {
            Box::pin(async { Err(Self::error()) })
        }

        fn watch(&self) -> broadcast::Receiver<DocumentChange> {
            self.changes.subscribe()
        }
    }

    fn service() -> (DemographicService, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        (DemographicService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_population_total_is_derived_on_write() {
        let (service, _) = service();
        for (male, female) in [(0, 0), (4120, 4380), (-5, 10)] {
            assert!(service.update_population_data(male, female).await);
            let population = service.get_population_data().await.unwrap();
            assert_eq!(population.total, male + female);
            assert_eq!((population.male, population.female), (male, female));
        }
    }

    #[tokio::test]
    async fn test_missing_documents_read_as_empty() {
        let (service, _) = service();
        assert!(service.get_population_data().await.is_none());
        assert!(service.get_religions_data().await.is_empty());
        assert!(service.get_jobs_data().await.is_empty());
        assert!(service.get_education_data().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_items_recomputes_totals_and_replaces_list() {
        let (service, _) = service();
        let jobs = vec![
            JobRecord { id: "guru".to_string(), label: "GURU".to_string(), male: 10, female: 25, total: 999 },
            JobRecord { id: "petani-pekebun".to_string(), label: "PETANI/PEKEBUN".to_string(), male: 80, female: 20, total: 0 },
        ];
        assert!(service.update_jobs_data(jobs).await);
        assert!(service.update_jobs_data(vec![JobRecord { id: "dokter".to_string(), label: "DOKTER".to_string(), male: 1, female: 2, total: 0 }]).await);
        let stored = service.get_jobs_data().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].total, 3);
    }

    #[tokio::test]
    async fn test_religions_keep_icon() {
        let (service, _) = service();
        let religions = vec![ReligionRecord { id: "islam".to_string(), name: "Islam".to_string(), male: 3, female: 4, total: 0, icon: "fa-moon".to_string() }];
        assert!(service.update_religions_data(religions).await);
        let stored = service.get_religions_data().await;
        assert_eq!(stored[0].icon, "fa-moon");
        assert_eq!(stored[0].total, 7);
    }

    #[tokio::test]
    async fn test_malformed_document_reads_as_empty() {
        let (service, store) = service();
        store.set(&DocumentKey::demographics(EDUCATION_DOC), json!({ "items": "not a list" })).await.unwrap();
        assert!(service.get_education_data().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_seeds_exactly_once() {
        let (service, _) = service();
        assert_eq!(service.initialize_demographic_data().await, SeedOutcome::Seeded);
        let first = service.get_population_data().await.unwrap();
        assert!((8000..=9000).contains(&first.total));
        assert_eq!(service.get_religions_data().await.len(), 7);
        assert_eq!(service.get_jobs_data().await.len(), 99);
        assert_eq!(service.get_education_data().await.len(), 10);

        assert_eq!(service.initialize_demographic_data().await, SeedOutcome::AlreadyInitialized);
        assert_eq!(service.get_population_data().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_concurrent_initialization_seeds_once() {
        let (service, _) = service();
        let service = Arc::new(service);
        let (first, second) = tokio::join!(service.initialize_demographic_data(), service.initialize_demographic_data());
        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|outcome| *outcome == SeedOutcome::Seeded);
        assert_eq!(outcomes, vec![SeedOutcome::AlreadyInitialized, SeedOutcome::Seeded]);
    }

    #[tokio::test]
    async fn test_subscription_delivers_written_record() {
        let (service, _) = service();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = service.subscribe_to_population_data(move |population| drop(sender.send(population)));
        let initial = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap();
        assert!(initial.is_none());

        assert!(service.update_population_data(100, 120).await);
        let delivered = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap().unwrap();
        assert_eq!(delivered.total, 220);
    }

    #[tokio::test]
    async fn test_list_subscription_delivers_items() {
        let (service, _) = service();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _subscription = service.subscribe_to_education_data(move |education| drop(sender.send(education)));
        assert!(tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap().is_empty());

        let education = vec![EducationRecord { id: "slta".to_string(), level: "SLTA/Sederajat".to_string(), male: 5, female: 6, total: 0 }];
        assert!(service.update_education_data(education).await);
        let delivered = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap().unwrap();
        assert_eq!(delivered[0].total, 11);
    }

    #[tokio::test]
    async fn test_store_failures_are_not_propagated() {
        let service = DemographicService::new(Arc::new(FailingDocumentStore::new()));
        assert!(service.get_population_data().await.is_none());
        assert!(service.get_jobs_data().await.is_empty());
        assert!(!service.update_population_data(1, 2).await);
        assert!(!service.update_religions_data(vec![]).await);
        assert_eq!(service.initialize_demographic_data().await, SeedOutcome::Failed);
    }
}
