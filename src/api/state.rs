use crate::{
    api::security::JwtSecurityService,
    service::{budget::BudgetService, bumdes::BumdesService, demographics::DemographicService},
};

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * The JWT security service guarding the admin endpoints.
     */
    pub jwt_service: JwtSecurityService,
    pub demographic_service: DemographicService,
    pub budget_service: BudgetService,
    pub bumdes_service: BumdesService,
}

impl AppState {
    /**
     * Creates a new instance of `AppState`.
     *
     * # Arguments
     * `jwt_service`: The JWT security service guarding the admin endpoints.
     * `demographic_service`: Service for the demographic documents.
     * `budget_service`: Service for the yearly budget documents.
     * `bumdes_service`: Service for the BUMDes catalog and its images.
     */
    pub fn new(jwt_service: JwtSecurityService, demographic_service: DemographicService, budget_service: BudgetService, bumdes_service: BumdesService) -> Self {
        AppState { jwt_service, demographic_service, budget_service, bumdes_service }
    }
}

/**
 * Application state backed by in-memory stores for endpoint tests.
 */
#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::{
        api::security::testing::security_service,
        dao::{
            bumdes::BundledBumdes,
            memory::{InMemoryBumdesStore, InMemoryDocumentStore, InMemoryImageStorage},
            storage::PublicUrlLayout,
        },
    };

    pub const PUBLIC_BASE_URL: &str = "http://localhost:8080";

    pub fn in_memory_state() -> AppState {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let storage = Arc::new(InMemoryImageStorage::new(PublicUrlLayout::new(PUBLIC_BASE_URL, "images").unwrap()));
        AppState::new(
            security_service(),
            DemographicService::new(documents.clone()),
            BudgetService::new(documents),
            BumdesService::new(Arc::new(InMemoryBumdesStore::new()), BundledBumdes::new(), storage, "/placeholder.jpg".to_string()),
        )
    }
}
