use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    db::DocumentKey,
};

pub mod budget;
pub mod bumdes;
pub mod demographics;
pub mod seed;
pub mod subscription;

/**
 * Decodes a document body. A missing document decodes to `None`, a body of the wrong
 * shape is a database error.
 */
pub(crate) fn decode_document<T: DeserializeOwned>(key: &DocumentKey, body: Option<Value>) -> Result<Option<T>, ApplicationError> {
    body.map(|body| serde_json::from_value(body).map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Malformed document {key}: {err}"))))
        .transpose()
}

pub(crate) fn encode_document<T: Serialize>(key: &DocumentKey, document: &T) -> Result<Value, ApplicationError> {
    serde_json::to_value(document).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to encode document {key}: {err}")))
}
