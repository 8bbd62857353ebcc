use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{BudgetItem, BumdesAddUpdateInputType, BumdesFormInput, BumdesItem, BumdesStatus, SeedOutcome},
};

/***************** Demographic models *********************/

/**
 * Request to overwrite the population totals. The total is derived.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationUpdateRequest {
    pub male: i64,
    pub female: i64,
}

/**
 * Request replacing a whole list document.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsRequest<T> {
    pub items: Vec<T>,
}

/**
 * Response carrying a whole list document.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

impl<T> ItemsResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        ItemsResponse { items }
    }
}

/**
 * Response of the initialization endpoints.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResponse {
    pub outcome: SeedOutcome,
}

impl TryFrom<SeedOutcome> for SeedResponse {
    type Error = ApplicationError;

    fn try_from(outcome: SeedOutcome) -> Result<Self, Self::Error> {
        match outcome {
            SeedOutcome::Failed => Err(ApplicationError::new(ErrorType::DatabaseError, "Initialization failed".to_string())),
            outcome => Ok(SeedResponse { outcome }),
        }
    }
}

/***************** Budget models *********************/

/**
 * A budget line as sent by the admin form. The year is taken from the request path.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItemRequest {
    pub id: String,
    pub name: String,
    pub amount: Decimal,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<(BudgetItemRequest, i32)> for BudgetItem {
    fn from((request, year): (BudgetItemRequest, i32)) -> Self {
        BudgetItem { id: request.id, name: request.name, amount: request.amount, year, last_updated: request.last_updated.unwrap_or_else(Utc::now) }
    }
}

/***************** BUMDes models *********************/

/**
 * Request to add or save a BUMDes entry.
 *
 * Revenue and employees are accepted as numbers or numeric strings.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BumdesSaveRequest {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: String,
    pub status: BumdesStatus,
    pub established: String,
    pub manager: String,
    #[serde(default)]
    pub revenue: serde_json::Value,
    #[serde(default)]
    pub employees: serde_json::Value,
    pub location: String,
    /**
     * Url returned by a previous image upload.
     */
    pub image_url: Option<String>,
}

impl BumdesSaveRequest {
    /**
     * Validates the request.
     *
     * # Returns
     * The fields to store and the optional image url, or a validation error.
     */
    pub fn validate(self) -> Result<(BumdesAddUpdateInputType, Option<String>), ApplicationError> {
        let form = BumdesFormInput {
            title: self.title,
            description: self.description,
            content: self.content,
            category: self.category,
            status: self.status,
            established: self.established,
            manager: self.manager,
            revenue: self.revenue,
            employees: self.employees,
            location: self.location,
        };
        Ok((form.validate()?, self.image_url))
    }
}

/**
 * Response listing the catalog.
 */
#[derive(Debug, Serialize)]
pub struct BumdesListResponse {
    pub bumdes: Vec<BumdesItem>,
}

/**
 * Query of the image upload endpoint. The image itself is the request body.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadQuery {
    pub item_id: i64,
    pub file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageDeleteRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ImageDeleteResponse {
    pub deleted: bool,
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::JwtAuthorization => StatusCode::UNAUTHORIZED,
        ErrorType::Forbidden => StatusCode::FORBIDDEN,
        ErrorType::Initialization => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorType::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorType::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorType::Validation => StatusCode::BAD_REQUEST,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::ConstraintViolation => StatusCode::CONFLICT,
        ErrorType::Application => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::JwtAuthorization => 1000,
        ErrorType::Initialization => 1001,
        ErrorType::Forbidden => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::StorageError => 1004,
        ErrorType::Validation => 1005,
        ErrorType::NotFound => 1006,
        ErrorType::ConstraintViolation => 1007,
        ErrorType::Application => 1008,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn save_request(body: serde_json::Value) -> BumdesSaveRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_save_request_validation() {
        let request = save_request(json!({
            "title": "Toko Desa",
            "description": "Sembako",
            "content": "Toko kebutuhan pokok",
            "category": "Perdagangan",
            "status": "Aktif",
            "established": "2019-08-01",
            "manager": "Siti Aminah",
            "revenue": "126500000",
            "employees": 4,
            "location": "Jalan Raya Desa",
            "imageUrl": "http://localhost:8080/storage/v1/object/public/images/bumdes/a.png"
        }));
        let (input, image_url) = request.validate().unwrap();
        assert_eq!(input.revenue, 126_500_000);
        assert_eq!(input.employees, 4);
        assert!(image_url.is_some());
    }

    #[test]
    fn test_save_request_missing_location() {
        let request = save_request(json!({
            "title": "Toko Desa",
            "description": "Sembako",
            "content": "Toko kebutuhan pokok",
            "category": "Perdagangan",
            "status": "Non-Aktif",
            "established": "2019-08-01",
            "manager": "Siti Aminah",
            "location": ""
        }));
        let err = request.validate().unwrap_err();
        assert_eq!(err.message, "Location is required");
    }

    #[test]
    fn test_budget_item_takes_path_year() {
        let request: BudgetItemRequest = serde_json::from_value(json!({ "id": "pad", "name": "Pendapatan Asli Desa", "amount": 325310200 })).unwrap();
        let item = BudgetItem::from((request, 2026));
        assert_eq!(item.year, 2026);
        assert_eq!(item.amount, Decimal::new(325_310_200, 0));
    }

    #[test]
    fn test_error_mapping() {
        let response = ApplicationError::new(ErrorType::Forbidden, "Forbidden".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(get_error_code(&ErrorType::ConstraintViolation), 1007);
        assert_eq!(get_statuscode(&ErrorType::Validation), StatusCode::BAD_REQUEST);
        assert!(SeedResponse::try_from(SeedOutcome::Failed).is_err());
    }
}
