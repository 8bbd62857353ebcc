use std::path::{Component, Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use url::Url;

use crate::{
    dao::StoreFuture,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::StoredObject,
        validation::content_type_for_path,
    },
};

/**
 * Path prefix of public object urls, followed by `{bucket}/{path}`.
 */
pub const PUBLIC_OBJECT_PREFIX: &str = "storage/v1/object/public";

/**
 * Characters escaped inside one path segment of a public url.
 */
const PATH_SEGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'/').add(b'<').add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

/**
 * Object storage bucket holding uploaded images.
 */
pub trait ImageStorage: Send + Sync {
    /**
     * Stores a new object. Fails if an object already exists at `path`.
     */
    fn upload<'a>(&'a self, path: &'a str, content_type: &'a str, bytes: Vec<u8>) -> StoreFuture<'a, ()>;

    /**
     * Reads an object, `None` if it does not exist.
     */
    fn download<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<StoredObject>>;

    /**
     * Removes an object. Removing a missing object succeeds.
     */
    fn remove<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()>;

    /**
     * Layout of the public urls of this bucket.
     */
    fn layout(&self) -> &PublicUrlLayout;
}

/**
 * Maps object paths to public urls and back.
 */
#[derive(Debug, Clone)]
pub struct PublicUrlLayout {
    base_url: Url,
    bucket: String,
}

impl PublicUrlLayout {
    /**
     * Creates a new instance of `PublicUrlLayout`.
     *
     * # Arguments
     * `public_base_url`: Scheme, host and optional path prefix the server is reachable at.
     * `bucket`: Name of the bucket.
     */
    pub fn new(public_base_url: &str, bucket: &str) -> Result<Self, ApplicationError> {
        let base_url = Url::parse(public_base_url.trim_end_matches('/')).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid public base url {public_base_url}: {err}")))?;
        if bucket.is_empty() || bucket.contains('/') {
            return Err(ApplicationError::new(ErrorType::Initialization, format!("Invalid bucket name: {bucket}")));
        }
        Ok(PublicUrlLayout { base_url, bucket: bucket.to_string() })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /**
     * Public url of the object at `path`. Each path segment is percent-encoded.
     */
    pub fn public_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path.split('/').map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string()).collect();
        format!("{}/{PUBLIC_OBJECT_PREFIX}/{}/{}", self.base_url.as_str().trim_end_matches('/'), self.bucket, encoded.join("/"))
    }

    /**
     * Extracts the object path from a public url of this bucket.
     *
     * # Returns
     * `None` when the url cannot be parsed, has no `/storage/.../public/` segments or
     * names another bucket.
     */
    pub fn object_path(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed.path_segments()?.collect();
        if !segments.contains(&"storage") {
            return None;
        }
        let public_index = segments.iter().position(|segment| *segment == "public")?;
        let (bucket, path) = segments.get(public_index + 1..)?.split_first()?;
        if *bucket != self.bucket || path.is_empty() {
            return None;
        }
        let decoded = path.iter().map(|segment| percent_decode_str(segment).decode_utf8().ok().map(|segment| segment.into_owned())).collect::<Option<Vec<String>>>()?;
        if decoded.iter().any(|segment| segment.is_empty() || segment.contains('/')) {
            return None;
        }
        Some(decoded.join("/"))
    }

    /**
     * Whether `url` points into this bucket on the configured host. Placeholders and
     * external images are not managed.
     */
    pub fn is_managed(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.origin() == self.base_url.origin() && self.object_path(url).is_some(),
            Err(_) => false,
        }
    }
}

/**
 * Bucket kept as files below a root directory.
 */
pub struct LocalImageStorage {
    root_dir: PathBuf,
    layout: PublicUrlLayout,
}

impl LocalImageStorage {
    /**
     * Creates a new instance of `LocalImageStorage`.
     *
     * # Arguments
     * `root_dir`: Directory holding the objects.
     * `layout`: Layout of the public urls.
     */
    pub fn new(root_dir: &str, layout: PublicUrlLayout) -> Self {
        LocalImageStorage { root_dir: PathBuf::from(root_dir), layout }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ApplicationError> {
        let relative = Path::new(path);
        if path.is_empty() || !relative.components().all(|component| matches!(component, Component::Normal(_))) {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Invalid object path: {path}")));
        }
        Ok(self.root_dir.join(relative))
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn write_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), ApplicationError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| ApplicationError::new(ErrorType::StorageError, format!("Failed to create directory for {path}: {err}")))?;
        }
        let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(&target).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                ApplicationError::new(ErrorType::ConstraintViolation, format!("Object already exists: {path}"))
            } else {
                ApplicationError::new(ErrorType::StorageError, format!("Failed to create object {path}: {err}"))
            }
        })?;
        file.write_all(&bytes).await.map_err(|err| ApplicationError::new(ErrorType::StorageError, format!("Failed to write object {path}: {err}")))?;
        file.flush().await.map_err(|err| ApplicationError::new(ErrorType::StorageError, format!("Failed to flush object {path}: {err}")))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_object(&self, path: &str) -> Result<Option<StoredObject>, ApplicationError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(StoredObject { content_type: content_type_for_path(path).to_string(), bytes })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ApplicationError::new(ErrorType::StorageError, format!("Failed to read object {path}: {err}"))),
        }
    }

    #[instrument(skip(self))]
    async fn remove_object(&self, path: &str) -> Result<(), ApplicationError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ApplicationError::new(ErrorType::StorageError, format!("Failed to remove object {path}: {err}"))),
        }
    }
}

impl ImageStorage for LocalImageStorage {
    fn upload<'a>(&'a self, path: &'a str, _content_type: &'a str, bytes: Vec<u8>) -> StoreFuture<'a, ()> {
        Box::pin(self.write_object(path, bytes))
    }

    fn download<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<StoredObject>> {
        Box::pin(self.read_object(path))
    }

    fn remove<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.remove_object(path))
    }

    fn layout(&self) -> &PublicUrlLayout {
        &self.layout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn layout() -> PublicUrlLayout {
        PublicUrlLayout::new("https://desa.example.id/", "images").unwrap()
    }

    #[test]
    fn test_public_url() {
        assert_eq!(layout().public_url("bumdes/bumdes-3-1700.png"), "https://desa.example.id/storage/v1/object/public/images/bumdes/bumdes-3-1700.png");
    }

    #[test]
    fn test_object_path_from_public_url() {
        let layout = layout();
        let url = layout.public_url("bumdes/bumdes-3-1700.png");
        assert_eq!(layout.object_path(&url).as_deref(), Some("bumdes/bumdes-3-1700.png"));
    }

    #[test]
    fn test_object_path_rejects_unrecognized_urls() {
        let layout = layout();
        assert_eq!(layout.object_path("/placeholder.jpg"), None);
        assert_eq!(layout.object_path("https://desa.example.id/images/bumdes/a.png"), None);
        assert_eq!(layout.object_path("https://desa.example.id/storage/v1/object/public/other/bumdes/a.png"), None);
        assert_eq!(layout.object_path("https://desa.example.id/storage/v1/object/public/images"), None);
    }

    #[test]
    fn test_object_path_decodes_escaped_segments() {
        let layout = layout();
        let url = layout.public_url("bumdes/foto warung.png");
        assert_eq!(url, "https://desa.example.id/storage/v1/object/public/images/bumdes/foto%20warung.png");
        assert_eq!(layout.object_path(&url).as_deref(), Some("bumdes/foto warung.png"));
        assert_eq!(layout.object_path("https://desa.example.id/storage/v1/object/public/images/bumdes/a%2Fb.png"), None);
        assert_eq!(layout.object_path("https://desa.example.id/storage/v1/object/public/images/bumdes/%FF.png"), None);
    }

    #[test]
    fn test_is_managed() {
        let layout = layout();
        assert!(layout.is_managed("https://desa.example.id/storage/v1/object/public/images/bumdes/a.png"));
        assert!(!layout.is_managed("https://cdn.example.com/storage/v1/object/public/images/bumdes/a.png"));
        assert!(!layout.is_managed("/placeholder.jpg"));
    }

    #[test]
    fn test_invalid_layout() {
        assert!(PublicUrlLayout::new("not a url", "images").is_err());
        assert!(PublicUrlLayout::new("http://localhost:8080", "a/b").is_err());
    }

    #[tokio::test]
    async fn test_local_storage_lifecycle() {
        let root = std::env::temp_dir().join(format!("village-images-{}", uuid::Uuid::new_v4()));
        let storage = LocalImageStorage::new(root.to_str().unwrap(), layout());
        storage.upload("bumdes/a.png", "image/png", vec![1, 2, 3]).await.unwrap();
        let err = storage.upload("bumdes/a.png", "image/png", vec![4]).await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::ConstraintViolation);
        let object = storage.download("bumdes/a.png").await.unwrap().unwrap();
        assert_eq!(object, StoredObject { content_type: "image/png".to_string(), bytes: vec![1, 2, 3] });
        storage.remove("bumdes/a.png").await.unwrap();
        assert!(storage.download("bumdes/a.png").await.unwrap().is_none());
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let storage = LocalImageStorage::new("/tmp/village-images", layout());
        assert!(storage.download("../etc/passwd").await.is_err());
        assert!(storage.remove("/etc/passwd").await.is_err());
    }
}
