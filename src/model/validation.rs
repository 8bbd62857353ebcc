use crate::model::{apperror::ApplicationError, models::ImageUpload};

/**
 * Largest accepted image upload, 5 MiB.
 */
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/**
 * Longest accepted original file name.
 */
pub const MAX_FILE_NAME_LENGTH: usize = 100;

const ALLOWED_CONTENT_TYPES: [&str; 5] = ["image/jpeg", "image/jpg", "image/png", "image/webp", "image/gif"];

/**
 * Checks an image before it is sent to storage.
 *
 * # Arguments
 * `upload`: The image to check.
 *
 * # Returns
 * `Ok(())` or a validation error with a message suitable for the admin form.
 */
pub fn validate_image_file(upload: &ImageUpload) -> Result<(), ApplicationError> {
    let content_type = upload.content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ApplicationError::validation("Unsupported file type. Use JPG, PNG, WebP or GIF."));
    }
    if upload.bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApplicationError::validation(&format!("File too large ({}). Maximum is 5 MB.", format_file_size(upload.bytes.len() as u64))));
    }
    if upload.file_name.chars().count() > MAX_FILE_NAME_LENGTH {
        return Err(ApplicationError::validation("File name too long."));
    }
    Ok(())
}

/**
 * Formats a byte count for humans, e.g. `1.5 KB`.
 */
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/**
 * Builds the stored name of a BUMDes image: `bumdes-{itemId}-{epochMillis}.{ext}`.
 * The extension is the ASCII alphanumeric part of whatever follows the last dot of the
 * original name. Without one the name has no extension.
 */
pub fn generate_file_name(original_name: &str, item_id: i64, epoch_millis: i64) -> String {
    let extension: String = original_name.rsplit('.').next().unwrap_or(original_name).chars().filter(char::is_ascii_alphanumeric).collect();
    if extension.is_empty() {
        return format!("bumdes-{item_id}-{epoch_millis}");
    }
    format!("bumdes-{item_id}-{epoch_millis}.{extension}")
}

/**
 * Guesses the content type of a stored object from its extension.
 */
pub fn content_type_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::apperror::ErrorType;

    fn upload(content_type: &str, size: usize) -> ImageUpload {
        ImageUpload { file_name: "warung.png".to_string(), content_type: content_type.to_string(), bytes: vec![0; size] }
    }

    #[test]
    fn test_accepts_allowed_types_within_limit() {
        for content_type in ["image/jpeg", "image/jpg", "image/png", "image/webp", "image/gif"] {
            assert!(validate_image_file(&upload(content_type, 2 * 1024 * 1024)).is_ok(), "{content_type}");
        }
        assert!(validate_image_file(&upload("image/png", MAX_IMAGE_SIZE)).is_ok());
    }

    #[test]
    fn test_rejects_oversized_file() {
        let err = validate_image_file(&upload("image/png", MAX_IMAGE_SIZE + 1)).unwrap_err();
        assert_eq!(err.error_type, ErrorType::Validation);
        assert!(err.message.starts_with("File too large (5 MB)"));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        assert!(validate_image_file(&upload("image/svg+xml", 10)).is_err());
        assert!(validate_image_file(&upload("application/pdf", 10)).is_err());
    }

    #[test]
    fn test_rejects_long_file_name() {
        let mut image = upload("image/png", 10);
        image.file_name = format!("{}.png", "a".repeat(100));
        assert_eq!(validate_image_file(&image).unwrap_err().message, "File name too long.");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(6_500_000), "6.2 MB");
    }

    #[test]
    fn test_generate_file_name() {
        assert_eq!(generate_file_name("Foto Warung.JPG", 7, 1_718_000_000_000), "bumdes-7-1718000000000.JPG");
        assert_eq!(generate_file_name("logo.final.webp", 12, 5), "bumdes-12-5.webp");
        assert_eq!(generate_file_name("foto warung", 1, 5), "bumdes-1-5.fotowarung");
        assert_eq!(generate_file_name("foto.p n?g", 1, 5), "bumdes-1-5.png");
        assert_eq!(generate_file_name("foto.%%", 1, 5), "bumdes-1-5");
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path("bumdes/bumdes-1-2.PNG"), "image/png");
        assert_eq!(content_type_for_path("bumdes/readme"), "application/octet-stream");
    }
}
