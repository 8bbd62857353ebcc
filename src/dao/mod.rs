use futures_util::future::BoxFuture;

use crate::model::apperror::ApplicationError;

pub mod bumdes;
pub mod documents;
pub mod memory;
pub mod storage;

/**
 * Future returned by the storage seams.
 */
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, ApplicationError>>;
