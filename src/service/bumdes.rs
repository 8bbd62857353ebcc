use std::sync::Arc;

use chrono::Utc;

use crate::{
    dao::{
        bumdes::{BumdesStore, BundledBumdes},
        storage::ImageStorage,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{BumdesAddUpdateInputType, BumdesItem, ImageUpload, StoredObject},
        validation::{generate_file_name, validate_image_file},
    },
};

/**
 * Folder of the bucket holding BUMDes images.
 */
const BUMDES_IMAGE_FOLDER: &str = "bumdes";

/**
 * Represents the service managing the BUMDes catalog and its images.
 */
pub struct BumdesService {
    /**
     * Primary store of the catalog.
     */
    bumdes_store: Arc<dyn BumdesStore>,
    /**
     * Catalog served when the primary store fails.
     */
    bundled: BundledBumdes,
    image_storage: Arc<dyn ImageStorage>,
    /**
     * Image url of entries created without an image.
     */
    placeholder_image: String,
}

impl BumdesService {
    /**
     * Creates a new instance of `BumdesService`.
     *
     * # Arguments
     * `bumdes_store`: Primary store of the catalog.
     * `bundled`: Secondary source used when the primary store fails.
     * `image_storage`: Bucket holding uploaded images.
     * `placeholder_image`: Image url of entries created without an image.
     */
    pub fn new(bumdes_store: Arc<dyn BumdesStore>, bundled: BundledBumdes, image_storage: Arc<dyn ImageStorage>, placeholder_image: String) -> Self {
        BumdesService { bumdes_store, bundled, image_storage, placeholder_image }
    }

    /**
     * Retrieves the whole catalog, newest first.
     *
     * # Returns
     * The stored entries. When the store cannot be read the bundled catalog, and when
     * that cannot be parsed either, an empty list.
     */
    pub async fn get_bumdes_data(&self) -> Vec<BumdesItem> {
        match self.bumdes_store.list().await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!("Error fetching BUMDes data, using bundled data: {}", err);
                self.bundled.load().unwrap_or_else(|err| {
                    tracing::error!("Error loading bundled BUMDes data: {}", err);
                    Vec::new()
                })
            }
        }
    }

    /**
     * Retrieves one entry, looked up in the bundled catalog when the store cannot be read.
     */
    pub async fn get_bumdes_item(&self, id: i64) -> Option<BumdesItem> {
        match self.bumdes_store.get(id).await {
            Ok(item) => item,
            Err(err) => {
                tracing::error!("Error fetching BUMDes {}, using bundled data: {}", id, err);
                self.bundled.load().ok()?.into_iter().find(|item| item.id == id)
            }
        }
    }

    /**
     * Validates and stores an image for an entry.
     *
     * # Arguments
     * `upload`: The image file.
     * `item_id`: Id of the entry the image belongs to, part of the stored name.
     *
     * # Returns
     * The public url of the stored image, a validation error before anything is stored,
     * or a storage error.
     */
    pub async fn upload_bumdes_image(&self, upload: ImageUpload, item_id: i64) -> Result<String, ApplicationError> {
        validate_image_file(&upload)?;
        let file_name = generate_file_name(&upload.file_name, item_id, Utc::now().timestamp_millis());
        let path = format!("{BUMDES_IMAGE_FOLDER}/{file_name}");
        if let Err(err) = self.image_storage.upload(&path, &upload.content_type, upload.bytes).await {
            tracing::error!("Error uploading image {}: {}", path, err);
            return Err(err);
        }
        Ok(self.image_storage.layout().public_url(&path))
    }

    /**
     * Removes a stored image by its public url.
     *
     * # Returns
     * `false` if the url does not point into the bucket or the removal failed.
     */
    pub async fn delete_bumdes_image(&self, image_url: &str) -> bool {
        let Some(path) = self.image_storage.layout().object_path(image_url) else {
            tracing::error!("Cannot extract file path from url {}", image_url);
            return false;
        };
        match self.image_storage.remove(&path).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Error deleting image {}: {}", path, err);
                false
            }
        }
    }

    /**
     * Overwrites the fields of an entry, and its image when `new_image_url` is given.
     *
     * # Returns
     * `true` if the entry was updated.
     */
    pub async fn update_bumdes_item(&self, id: i64, input: BumdesAddUpdateInputType, new_image_url: Option<String>) -> bool {
        match self.bumdes_store.update(id, input, new_image_url).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Error updating BUMDes {}: {}", id, err);
                false
            }
        }
    }

    /**
     * Adds an entry. Without an image url the placeholder image is used.
     *
     * # Returns
     * The stored entry, `None` if it could not be stored.
     */
    pub async fn add_bumdes_item(&self, input: BumdesAddUpdateInputType, image_url: Option<String>) -> Option<BumdesItem> {
        let image = image_url.filter(|url| !url.trim().is_empty()).unwrap_or_else(|| self.placeholder_image.clone());
        match self.bumdes_store.insert(input, image).await {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::error!("Error adding BUMDes item: {}", err);
                None
            }
        }
    }

    /**
     * Saves an edited entry. When a new image supersedes a stored one, the stored image
     * is removed after the entry was updated.
     *
     * # Arguments
     * `id`: Id of the entry.
     * `input`: The validated form fields.
     * `new_image_url`: Url of a newly uploaded image, if any.
     *
     * # Returns
     * The updated entry or `NotFound` if it does not exist.
     */
    pub async fn replace_bumdes_item(&self, id: i64, input: BumdesAddUpdateInputType, new_image_url: Option<String>) -> Result<BumdesItem, ApplicationError> {
        let previous = self.bumdes_store.get(id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()))?;
        let new_image_url = new_image_url.filter(|url| !url.trim().is_empty());
        self.bumdes_store.update(id, input, new_image_url.clone()).await?;
        if let Some(new_image_url) = &new_image_url {
            if *new_image_url != previous.image && self.image_storage.layout().is_managed(&previous.image) && !self.delete_bumdes_image(&previous.image).await {
                tracing::warn!("Previous image of BUMDes {} was not removed: {}", id, previous.image);
            }
        }
        self.bumdes_store.get(id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()))
    }

    /**
     * Deletes an entry and, best-effort, its stored image.
     *
     * # Returns
     * `true` if the entry was deleted.
     */
    pub async fn delete_bumdes_item(&self, id: i64) -> bool {
        match self.remove_bumdes_item(id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Error deleting BUMDes {}: {}", id, err);
                false
            }
        }
    }

    /**
     * Deletes an entry. Its image is removed first when it lives in the managed bucket;
     * a failed image removal does not stop the row deletion.
     *
     * # Returns
     * `NotFound` if the entry does not exist.
     */
    pub async fn remove_bumdes_item(&self, id: i64) -> Result<(), ApplicationError> {
        let item = self.bumdes_store.get(id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()))?;
        if self.image_storage.layout().is_managed(&item.image) && !self.delete_bumdes_image(&item.image).await {
            tracing::warn!("Image of BUMDes {} was not removed: {}", id, item.image);
        }
        self.bumdes_store.delete(id).await
    }

    /**
     * Reads a stored image for serving.
     *
     * # Arguments
     * `bucket`: Bucket named in the request path.
     * `path`: Object path inside the bucket.
     */
    pub async fn get_stored_image(&self, bucket: &str, path: &str) -> Result<Option<StoredObject>, ApplicationError> {
        if bucket != self.image_storage.layout().bucket() {
            return Ok(None);
        }
        self.image_storage.download(path).await
    }
}
